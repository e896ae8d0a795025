use aeropool_domain::booking::{
    Booking, BookingStatus, PaymentMethod, PaymentStatus, RefundReason, Stop,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{StoreError, StoreResult};

pub struct BookingRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ride_id: Uuid,
    passenger_id: Uuid,
    seats: i32,
    luggage: i32,
    status: String,
    pickup: Option<serde_json::Value>,
    dropoff: Option<serde_json::Value>,
    payment_status: String,
    payment_method: String,
    amount: i64,
    psp_intent_id: Option<String>,
    refund_id: Option<String>,
    refunded_at: Option<DateTime<Utc>>,
    refund_reason: Option<String>,
    refund_failed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(crate) const BOOKING_COLUMNS: &str = "id, ride_id, passenger_id, seats, luggage, status, pickup, dropoff, payment_status, \
     payment_method, amount, psp_intent_id, refund_id, refunded_at, refund_reason, \
     refund_failed, created_at, updated_at";

fn map_booking(row: BookingRow) -> StoreResult<Booking> {
    let status = BookingStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Decode(format!("unknown booking status {}", row.status)))?;
    let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
        StoreError::Decode(format!("unknown payment status {}", row.payment_status))
    })?;
    let payment_method = PaymentMethod::parse(&row.payment_method).ok_or_else(|| {
        StoreError::Decode(format!("unknown payment method {}", row.payment_method))
    })?;
    let refund_reason = match row.refund_reason.as_deref() {
        Some(reason) => Some(
            RefundReason::parse(reason)
                .ok_or_else(|| StoreError::Decode(format!("unknown refund reason {reason}")))?,
        ),
        None => None,
    };
    let decode_stop = |value: Option<serde_json::Value>, field: &str| -> StoreResult<Option<Stop>> {
        value
            .map(|v| serde_json::from_value(v).map_err(|e| StoreError::Decode(format!("{field}: {e}"))))
            .transpose()
    };
    Ok(Booking {
        id: row.id,
        ride_id: row.ride_id,
        passenger_id: row.passenger_id,
        seats: row.seats,
        luggage: row.luggage,
        status,
        pickup: decode_stop(row.pickup, "pickup")?,
        dropoff: decode_stop(row.dropoff, "dropoff")?,
        payment_status,
        payment_method,
        amount: row.amount,
        psp_intent_id: row.psp_intent_id,
        refund_id: row.refund_id,
        refunded_at: row.refunded_at,
        refund_reason,
        refund_failed: row.refund_failed,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub struct NewBooking {
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub luggage: i32,
    pub status: BookingStatus,
    pub pickup: Option<Stop>,
    pub dropoff: Option<Stop>,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub amount: i64,
    pub psp_intent_id: Option<String>,
}

/// Insert usable both standalone and inside the payment transactions.
/// Duplicate (ride, passenger) surfaces as a conflict.
pub async fn insert_booking(
    conn: &mut sqlx::PgConnection,
    new: NewBooking,
) -> StoreResult<Booking> {
    let id = Uuid::new_v4();
    let pickup = new.pickup.as_ref().map(|s| serde_json::to_value(s).unwrap_or_default());
    let dropoff = new.dropoff.as_ref().map(|s| serde_json::to_value(s).unwrap_or_default());
    let sql = format!(
        "INSERT INTO bookings (id, ride_id, passenger_id, seats, luggage, status, pickup, \
            dropoff, payment_status, payment_method, amount, psp_intent_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {BOOKING_COLUMNS}"
    );
    let row: BookingRow = sqlx::query_as(&sql)
        .bind(id)
        .bind(new.ride_id)
        .bind(new.passenger_id)
        .bind(new.seats)
        .bind(new.luggage)
        .bind(new.status.as_str())
        .bind(pickup)
        .bind(dropoff)
        .bind(new.payment_status.as_str())
        .bind(new.payment_method.as_str())
        .bind(new.amount)
        .bind(new.psp_intent_id)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            if crate::is_unique_violation(&e) {
                StoreError::Conflict("passenger already has a booking on this ride".into())
            } else {
                StoreError::Sqlx(e)
            }
        })?;
    map_booking(row)
}

/// Row-locked fetch for the state-transition flows.
pub async fn lock_booking(
    conn: &mut sqlx::PgConnection,
    booking_id: Uuid,
) -> StoreResult<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
    let row: Option<BookingRow> =
        sqlx::query_as(&sql).bind(booking_id).fetch_optional(conn).await?;
    row.map(map_booking).transpose()
}

/// Conditional status flip; returns false when the row was not in `from`.
/// This is what makes concurrent cancellations collapse to one winner.
pub async fn set_status_if<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    booking_id: Uuid,
    from: &[BookingStatus],
    to: BookingStatus,
) -> Result<bool, sqlx::Error> {
    let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
    let result = sqlx::query(
        "UPDATE bookings SET status = $3, updated_at = NOW() \
         WHERE id = $1 AND status = ANY($2)",
    )
    .bind(booking_id)
    .bind(&from)
    .bind(to.as_str())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_refund_reason<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    booking_id: Uuid,
    reason: RefundReason,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bookings SET refund_reason = $2, updated_at = NOW() WHERE id = $1")
        .bind(booking_id)
        .bind(reason.as_str())
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn mark_refunded<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    booking_id: Uuid,
    refund_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE bookings SET payment_status = 'refunded', refund_id = COALESCE($2, refund_id), \
            refunded_at = NOW(), updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(booking_id)
    .bind(refund_id)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn mark_refund_failed<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    booking_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bookings SET refund_failed = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(booking_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn set_payment_failed_by_intent<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    intent_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE bookings SET payment_status = 'failed', updated_at = NOW() \
         WHERE psp_intent_id = $1 AND payment_status = 'unpaid'",
    )
    .bind(intent_id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Non-terminal bookings of a ride, locked for the cancellation cascade.
pub async fn lock_open_bookings_for_ride(
    conn: &mut sqlx::PgConnection,
    ride_id: Uuid,
) -> StoreResult<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings \
         WHERE ride_id = $1 AND status IN ('pending', 'accepted') FOR UPDATE"
    );
    let rows: Vec<BookingRow> = sqlx::query_as(&sql).bind(ride_id).fetch_all(conn).await?;
    rows.into_iter().map(map_booking).collect()
}

impl BookingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row: Option<BookingRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(map_booking).transpose()
    }

    pub async fn exists_for(&self, ride_id: Uuid, passenger_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE ride_id = $1 AND passenger_id = $2)",
        )
        .bind(ride_id)
        .bind(passenger_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn my_bookings(
        &self,
        passenger_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE passenger_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(passenger_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_booking).collect()
    }

    /// Bookings of a ride with the passenger's display name, for the
    /// driver's overview.
    pub async fn list_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<(Booking, String)>> {
        let sql = format!(
            "SELECT b.{}, u.display_name AS passenger_name FROM bookings b \
             JOIN users u ON u.id = b.passenger_id \
             WHERE b.ride_id = $1 ORDER BY b.created_at ASC",
            BOOKING_COLUMNS.replace(", ", ", b.")
        );
        #[derive(sqlx::FromRow)]
        struct RowWithName {
            #[sqlx(flatten)]
            booking: BookingRow,
            passenger_name: String,
        }
        let rows: Vec<RowWithName> = sqlx::query_as(&sql).bind(ride_id).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| Ok((map_booking(r.booking)?, r.passenger_name)))
            .collect()
    }

    /// Passenger resize of a pending booking; the capacity fit is checked
    /// by the caller against the ride.
    pub async fn update_seats(
        &self,
        id: Uuid,
        passenger_id: Uuid,
        seats: i32,
        luggage: i32,
    ) -> StoreResult<Option<Booking>> {
        let sql = format!(
            "UPDATE bookings SET seats = $3, luggage = $4, updated_at = NOW() \
             WHERE id = $1 AND passenger_id = $2 AND status = 'pending' \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(passenger_id)
            .bind(seats)
            .bind(luggage)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_booking).transpose()
    }
}
