use aeropool_domain::rating::{Rating, RatingType};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{is_unique_violation, user_repo, StoreError, StoreResult};

pub struct RatingRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: Uuid,
    from_user_id: Uuid,
    to_user_id: Uuid,
    booking_id: Uuid,
    ride_id: Uuid,
    rating_type: String,
    stars: i32,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

const RATING_COLUMNS: &str =
    "id, from_user_id, to_user_id, booking_id, ride_id, rating_type, stars, comment, created_at";

fn map_rating(row: RatingRow) -> StoreResult<Rating> {
    let rating_type = RatingType::parse(&row.rating_type)
        .ok_or_else(|| StoreError::Decode(format!("unknown rating type {}", row.rating_type)))?;
    Ok(Rating {
        id: row.id,
        from_user_id: row.from_user_id,
        to_user_id: row.to_user_id,
        booking_id: row.booking_id,
        ride_id: row.ride_id,
        rating_type,
        stars: row.stars,
        comment: row.comment,
        created_at: row.created_at,
    })
}

#[derive(Debug, serde::Serialize)]
pub struct RatingStats {
    pub user_id: Uuid,
    pub mean: f64,
    pub count: i64,
    pub histogram: [i64; 5],
}

impl RatingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the rating and folds it into the recipient's aggregates in
    /// one transaction. (booking, author) uniqueness turns a second
    /// attempt into a conflict.
    pub async fn create(
        &self,
        from_user_id: Uuid,
        to_user_id: Uuid,
        booking_id: Uuid,
        ride_id: Uuid,
        rating_type: RatingType,
        stars: i32,
        comment: Option<&str>,
    ) -> StoreResult<Rating> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO ratings (id, from_user_id, to_user_id, booking_id, ride_id, \
                rating_type, stars, comment) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {RATING_COLUMNS}"
        );
        let row: RatingRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(from_user_id)
            .bind(to_user_id)
            .bind(booking_id)
            .bind(ride_id)
            .bind(rating_type.as_str())
            .bind(stars)
            .bind(comment)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict("booking already rated".into())
                } else {
                    e.into()
                }
            })?;

        user_repo::apply_rating(&mut *tx, to_user_id, stars).await?;
        tx.commit().await?;
        map_rating(row)
    }

    pub async fn exists(&self, booking_id: Uuid, from_user_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM ratings WHERE booking_id = $1 AND from_user_id = $2)",
        )
        .bind(booking_id)
        .bind(from_user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn stats_for_user(&self, user_id: Uuid) -> StoreResult<RatingStats> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT stars, COUNT(*) FROM ratings WHERE to_user_id = $1 GROUP BY stars",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let mut histogram = [0_i64; 5];
        let mut count = 0_i64;
        let mut sum = 0_i64;
        for (stars, n) in rows {
            if (1..=5).contains(&stars) {
                histogram[(stars - 1) as usize] = n;
                count += n;
                sum += stars as i64 * n;
            }
        }
        let mean = if count == 0 { 0.0 } else { sum as f64 / count as f64 };
        Ok(RatingStats { user_id, mean, count, histogram })
    }

    /// Accepted bookings of departed rides the user has not rated yet.
    pub async fn pending_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<Vec<PendingRating>> {
        let rows: Vec<PendingRatingRow> = sqlx::query_as(
            "SELECT b.id AS booking_id, b.ride_id, r.driver_id, b.passenger_id, r.departure_at \
             FROM bookings b JOIN rides r ON r.id = b.ride_id \
             WHERE b.status = 'accepted' \
               AND (b.passenger_id = $1 OR r.driver_id = $1) \
               AND r.departure_at + INTERVAL '30 minutes' <= $2 \
               AND NOT EXISTS (SELECT 1 FROM ratings rt \
                               WHERE rt.booking_id = b.id AND rt.from_user_id = $1) \
             ORDER BY r.departure_at DESC LIMIT 50",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| PendingRating {
                booking_id: row.booking_id,
                ride_id: row.ride_id,
                driver_id: row.driver_id,
                passenger_id: row.passenger_id,
                departure_at: row.departure_at,
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct PendingRatingRow {
    booking_id: Uuid,
    ride_id: Uuid,
    driver_id: Uuid,
    passenger_id: Uuid,
    departure_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize)]
pub struct PendingRating {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub passenger_id: Uuid,
    pub departure_at: DateTime<Utc>,
}

/// Rides whose rateable window opened within the scheduler's look-back
/// span, with their accepted bookings.
pub async fn rateable_window_bookings(
    pool: &PgPool,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> StoreResult<Vec<RateableBooking>> {
    let rows: Vec<RateableBookingRow> = sqlx::query_as(
        "SELECT b.id AS booking_id, b.ride_id, b.passenger_id, r.driver_id \
         FROM rides r JOIN bookings b ON b.ride_id = r.id \
         WHERE r.status = 'active' \
           AND b.status = 'accepted' \
           AND r.departure_at >= $1 AND r.departure_at <= $2",
    )
    .bind(window_start)
    .bind(window_end)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| RateableBooking {
            booking_id: row.booking_id,
            ride_id: row.ride_id,
            passenger_id: row.passenger_id,
            driver_id: row.driver_id,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct RateableBookingRow {
    booking_id: Uuid,
    ride_id: Uuid,
    passenger_id: Uuid,
    driver_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct RateableBooking {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Uuid,
}

/// Whether a rating of this direction already exists for the booking.
pub async fn rating_exists_for<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    booking_id: Uuid,
    rating_type: RatingType,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM ratings WHERE booking_id = $1 AND rating_type = $2)",
    )
    .bind(booking_id)
    .bind(rating_type.as_str())
    .fetch_one(exec)
    .await
}
