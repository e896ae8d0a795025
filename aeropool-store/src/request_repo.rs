use aeropool_core::geo::{haversine_m, GeoPoint};
use aeropool_domain::booking::{PaymentMethod, PaymentStatus};
use aeropool_domain::request::{
    Offer, OfferStatus, RequestDirection, RequestLocation, RequestStatus, RideRequest,
};
use aeropool_domain::search::{RequestSearchItem, RequestSearchParams};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{is_unique_violation, StoreError, StoreResult};

pub struct RequestRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    passenger_id: Uuid,
    airport_id: Uuid,
    direction: String,
    address: String,
    city: String,
    postcode: Option<String>,
    lon: f64,
    lat: f64,
    preferred_at: DateTime<Utc>,
    flexibility_minutes: i32,
    seats_needed: i32,
    luggage: i32,
    max_price_per_seat: Option<i64>,
    notes: Option<String>,
    status: String,
    matched_driver_id: Option<Uuid>,
    matched_ride_id: Option<Uuid>,
    payment_status: String,
    payment_method: Option<String>,
    paid_amount: i64,
    psp_intent_id: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const REQUEST_COLUMNS: &str = "id, passenger_id, airport_id, direction, address, city, postcode, lon, lat, \
     preferred_at, flexibility_minutes, seats_needed, luggage, max_price_per_seat, notes, \
     status, matched_driver_id, matched_ride_id, payment_status, payment_method, \
     paid_amount, psp_intent_id, expires_at, created_at, updated_at";

fn map_request(row: RequestRow) -> StoreResult<RideRequest> {
    let direction = RequestDirection::parse(&row.direction)
        .ok_or_else(|| StoreError::Decode(format!("unknown request direction {}", row.direction)))?;
    let status = RequestStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Decode(format!("unknown request status {}", row.status)))?;
    let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
        StoreError::Decode(format!("unknown payment status {}", row.payment_status))
    })?;
    let payment_method = match row.payment_method.as_deref() {
        Some(m) => Some(
            PaymentMethod::parse(m)
                .ok_or_else(|| StoreError::Decode(format!("unknown payment method {m}")))?,
        ),
        None => None,
    };
    Ok(RideRequest {
        id: row.id,
        passenger_id: row.passenger_id,
        airport_id: row.airport_id,
        direction,
        location: RequestLocation {
            address: row.address,
            city: row.city,
            postcode: row.postcode,
            point: GeoPoint::new(row.lon, row.lat),
        },
        preferred_at: row.preferred_at,
        flexibility_minutes: row.flexibility_minutes,
        seats_needed: row.seats_needed,
        luggage: row.luggage,
        max_price_per_seat: row.max_price_per_seat,
        notes: row.notes,
        status,
        matched_driver_id: row.matched_driver_id,
        matched_ride_id: row.matched_ride_id,
        payment_status,
        payment_method,
        paid_amount: row.paid_amount,
        psp_intent_id: row.psp_intent_id,
        expires_at: row.expires_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: Uuid,
    request_id: Uuid,
    driver_id: Uuid,
    ride_id: Option<Uuid>,
    price_per_seat: i64,
    message: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

const OFFER_COLUMNS: &str =
    "id, request_id, driver_id, ride_id, price_per_seat, message, status, created_at";

fn map_offer(row: OfferRow) -> StoreResult<Offer> {
    let status = OfferStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Decode(format!("unknown offer status {}", row.status)))?;
    Ok(Offer {
        id: row.id,
        request_id: row.request_id,
        driver_id: row.driver_id,
        ride_id: row.ride_id,
        price_per_seat: row.price_per_seat,
        message: row.message,
        status,
        created_at: row.created_at,
    })
}

pub struct NewRequest {
    pub passenger_id: Uuid,
    pub airport_id: Uuid,
    pub direction: RequestDirection,
    pub location: RequestLocation,
    pub preferred_at: DateTime<Utc>,
    pub flexibility_minutes: i32,
    pub seats_needed: i32,
    pub luggage: i32,
    pub max_price_per_seat: Option<i64>,
    pub notes: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl RequestRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewRequest) -> StoreResult<RideRequest> {
        let sql = format!(
            "INSERT INTO ride_requests (id, passenger_id, airport_id, direction, address, city, \
                postcode, lon, lat, preferred_at, flexibility_minutes, seats_needed, luggage, \
                max_price_per_seat, notes, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {REQUEST_COLUMNS}"
        );
        let row: RequestRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(new.passenger_id)
            .bind(new.airport_id)
            .bind(new.direction.as_str())
            .bind(&new.location.address)
            .bind(&new.location.city)
            .bind(&new.location.postcode)
            .bind(new.location.point.lon)
            .bind(new.location.point.lat)
            .bind(new.preferred_at)
            .bind(new.flexibility_minutes)
            .bind(new.seats_needed)
            .bind(new.luggage)
            .bind(new.max_price_per_seat)
            .bind(&new.notes)
            .bind(new.expires_at)
            .fetch_one(&self.pool)
            .await?;
        map_request(row)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<RideRequest>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1");
        let row: Option<RequestRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(map_request).transpose()
    }

    pub async fn my_requests(
        &self,
        passenger_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<RideRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE passenger_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<RequestRow> = sqlx::query_as(&sql)
            .bind(passenger_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_request).collect()
    }

    pub async fn insert_offer(
        &self,
        request_id: Uuid,
        driver_id: Uuid,
        ride_id: Option<Uuid>,
        price_per_seat: i64,
        message: Option<&str>,
    ) -> StoreResult<Offer> {
        let sql = format!(
            "INSERT INTO request_offers (id, request_id, driver_id, ride_id, price_per_seat, message) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {OFFER_COLUMNS}"
        );
        let row: OfferRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(request_id)
            .bind(driver_id)
            .bind(ride_id)
            .bind(price_per_seat)
            .bind(message)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict("driver already has a pending offer on this request".into())
                } else {
                    e.into()
                }
            })?;
        map_offer(row)
    }

    pub async fn get_offer(&self, offer_id: Uuid) -> StoreResult<Option<Offer>> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM request_offers WHERE id = $1");
        let row: Option<OfferRow> =
            sqlx::query_as(&sql).bind(offer_id).fetch_optional(&self.pool).await?;
        row.map(map_offer).transpose()
    }

    pub async fn offers_for_request(&self, request_id: Uuid) -> StoreResult<Vec<Offer>> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM request_offers WHERE request_id = $1 \
             ORDER BY created_at ASC"
        );
        let rows: Vec<OfferRow> =
            sqlx::query_as(&sql).bind(request_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(map_offer).collect()
    }

    pub async fn my_offers(&self, driver_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<Offer>> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM request_offers WHERE driver_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<OfferRow> = sqlx::query_as(&sql)
            .bind(driver_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_offer).collect()
    }

    /// A driver pulling their pending bid removes the row, freeing the
    /// unique slot for a later re-offer.
    pub async fn withdraw_offer(&self, request_id: Uuid, driver_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM request_offers \
             WHERE request_id = $1 AND driver_id = $2 AND status = 'pending'",
        )
        .bind(request_id)
        .bind(driver_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn reject_offer(&self, offer_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE request_offers SET status = 'rejected', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(offer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Passenger closing their own request; pending offers are rejected so
    /// their drivers can be told. Returns the rejected offers.
    pub async fn cancel_request(
        &self,
        request_id: Uuid,
        passenger_id: Uuid,
    ) -> StoreResult<Option<Vec<Offer>>> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE ride_requests SET status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND passenger_id = $2 AND status = 'pending'",
        )
        .bind(request_id)
        .bind(passenger_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }
        let sql = format!(
            "UPDATE request_offers SET status = 'rejected', updated_at = NOW() \
             WHERE request_id = $1 AND status = 'pending' RETURNING {OFFER_COLUMNS}"
        );
        let rows: Vec<OfferRow> = sqlx::query_as(&sql).bind(request_id).fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(rows.into_iter().map(map_offer).collect::<StoreResult<Vec<_>>>()?))
    }

    /// The periodic sweep: pending requests past their deadline flip to
    /// expired. Returns (request, passenger) pairs for logging.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<(Uuid, Uuid)>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "UPDATE ride_requests SET status = 'expired', updated_at = NOW() \
             WHERE status = 'pending' AND expires_at < $1 RETURNING id, passenger_id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Driver-side feed of open requests, annotated with whether this
    /// driver already has a bid in.
    pub async fn search(
        &self,
        params: &RequestSearchParams,
        driver_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(Vec<RequestSearchItem>, i64)> {
        let (day_filter, day_start, day_end) = match params.date {
            Some(date) => {
                let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
                (true, start, start + chrono::Duration::days(1))
            }
            None => (false, now, now),
        };
        let direction = params.direction.map(|d| d.as_str()).unwrap_or("");
        let airport = params.airport_id.unwrap_or(Uuid::nil());
        let city = params.city.clone().unwrap_or_default();

        let predicate = "FROM ride_requests rr JOIN users u ON u.id = rr.passenger_id \
             WHERE rr.status = 'pending' \
               AND rr.expires_at > $1 \
               AND rr.passenger_id <> $2 \
               AND ($3 = '00000000-0000-0000-0000-000000000000'::uuid OR rr.airport_id = $3) \
               AND ($4 = '' OR rr.direction = $4) \
               AND ($5 = '' OR rr.city ILIKE $5) \
               AND (NOT $6 OR (rr.preferred_at >= $7 AND rr.preferred_at < $8))";

        let sql = format!(
            "SELECT rr.id, rr.passenger_id, u.display_name, rr.airport_id, rr.direction, \
                rr.city, rr.address, rr.lon, rr.lat, rr.preferred_at, rr.flexibility_minutes, \
                rr.seats_needed, rr.luggage, rr.max_price_per_seat, rr.expires_at, \
                EXISTS(SELECT 1 FROM request_offers ro \
                       WHERE ro.request_id = rr.id AND ro.driver_id = $2) AS has_user_offered \
             {predicate} ORDER BY rr.preferred_at ASC LIMIT $9 OFFSET $10"
        );

        #[derive(sqlx::FromRow)]
        struct SearchRow {
            id: Uuid,
            passenger_id: Uuid,
            display_name: String,
            airport_id: Uuid,
            direction: String,
            city: String,
            address: String,
            lon: f64,
            lat: f64,
            preferred_at: DateTime<Utc>,
            flexibility_minutes: i32,
            seats_needed: i32,
            luggage: i32,
            max_price_per_seat: Option<i64>,
            expires_at: DateTime<Utc>,
            has_user_offered: bool,
        }

        // Geo searches pull a page-independent candidate set and rank in
        // memory, like the ride search.
        let (limit, offset) = match params.pickup {
            Some(_) => (500_i64, 0_i64),
            None => (params.page.limit, params.page.offset()),
        };

        let rows: Vec<SearchRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(driver_id)
            .bind(airport)
            .bind(direction)
            .bind(if city.is_empty() { String::new() } else { format!("%{city}%") })
            .bind(day_filter)
            .bind(day_start)
            .bind(day_end)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut items: Vec<RequestSearchItem> = Vec::with_capacity(rows.len());
        for row in rows {
            let direction = RequestDirection::parse(&row.direction).ok_or_else(|| {
                StoreError::Decode(format!("unknown request direction {}", row.direction))
            })?;
            let mut item = RequestSearchItem {
                id: row.id,
                passenger_id: row.passenger_id,
                passenger_name: row.display_name,
                airport_id: row.airport_id,
                direction,
                city: row.city,
                address: row.address,
                preferred_at: row.preferred_at,
                flexibility_minutes: row.flexibility_minutes,
                seats_needed: row.seats_needed,
                luggage: row.luggage,
                max_price_per_seat: row.max_price_per_seat,
                expires_at: row.expires_at,
                has_user_offered: row.has_user_offered,
                distance_m: None,
            };
            if let Some(pickup) = params.pickup {
                let d = haversine_m(pickup, GeoPoint::new(row.lon, row.lat));
                if d > params.radius_m {
                    continue;
                }
                item.distance_m = Some(d);
            }
            items.push(item);
        }

        match params.pickup {
            Some(_) => {
                items.sort_by(|a, b| {
                    a.distance_m.unwrap_or(f64::MAX).total_cmp(&b.distance_m.unwrap_or(f64::MAX))
                });
                let total = items.len() as i64;
                let start = (params.page.offset() as usize).min(items.len());
                let end = (start + params.page.limit as usize).min(items.len());
                Ok((items[start..end].to_vec(), total))
            }
            None => {
                let count_sql = format!("SELECT COUNT(*) {predicate}");
                let total: i64 = sqlx::query_scalar(&count_sql)
                    .bind(now)
                    .bind(driver_id)
                    .bind(airport)
                    .bind(direction)
                    .bind(if city.is_empty() { String::new() } else { format!("%{city}%") })
                    .bind(day_filter)
                    .bind(day_start)
                    .bind(day_end)
                    .fetch_one(&self.pool)
                    .await?;
                Ok((items, total))
            }
        }
    }
}

// ============================================================================
// Acceptance flip (composable inside the payment transaction)
// ============================================================================

pub async fn lock_request(
    conn: &mut sqlx::PgConnection,
    request_id: Uuid,
) -> StoreResult<Option<RideRequest>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1 FOR UPDATE");
    let row: Option<RequestRow> =
        sqlx::query_as(&sql).bind(request_id).fetch_optional(conn).await?;
    row.map(map_request).transpose()
}

pub async fn lock_offer(
    conn: &mut sqlx::PgConnection,
    offer_id: Uuid,
) -> StoreResult<Option<Offer>> {
    let sql = format!("SELECT {OFFER_COLUMNS} FROM request_offers WHERE id = $1 FOR UPDATE");
    let row: Option<OfferRow> = sqlx::query_as(&sql).bind(offer_id).fetch_optional(conn).await?;
    row.map(map_offer).transpose()
}

/// Flips the chosen offer accepted; returns false if it was no longer
/// pending (lost a race).
pub async fn accept_offer_row(
    conn: &mut sqlx::PgConnection,
    offer_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE request_offers SET status = 'accepted', updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(offer_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Rejects every sibling bid in the same statement; returns them for the
/// notification fan-out.
pub async fn reject_sibling_offers(
    conn: &mut sqlx::PgConnection,
    request_id: Uuid,
    accepted_offer_id: Uuid,
) -> StoreResult<Vec<Offer>> {
    let sql = format!(
        "UPDATE request_offers SET status = 'rejected', updated_at = NOW() \
         WHERE request_id = $1 AND id <> $2 AND status = 'pending' RETURNING {OFFER_COLUMNS}"
    );
    let rows: Vec<OfferRow> = sqlx::query_as(&sql)
        .bind(request_id)
        .bind(accepted_offer_id)
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(map_offer).collect()
}

#[allow(clippy::too_many_arguments)]
pub async fn mark_request_accepted(
    conn: &mut sqlx::PgConnection,
    request_id: Uuid,
    driver_id: Uuid,
    ride_id: Option<Uuid>,
    method: PaymentMethod,
    paid_amount: i64,
    psp_intent_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE ride_requests SET status = 'accepted', matched_driver_id = $2, \
            matched_ride_id = $3, payment_status = 'paid', payment_method = $4, \
            paid_amount = $5, psp_intent_id = $6, updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(request_id)
    .bind(driver_id)
    .bind(ride_id)
    .bind(method.as_str())
    .bind(paid_amount)
    .bind(psp_intent_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
