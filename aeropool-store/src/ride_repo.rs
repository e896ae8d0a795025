use aeropool_core::geo::{polyline_distance_m, GeoPoint};
use aeropool_domain::ride::{HomeLocation, Ride, RideDirection, RideStatus};
use aeropool_domain::search::{RideSearchItem, RideSearchParams};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{StoreError, StoreResult};

/// Candidate pool size for pickup-point searches before geo ranking.
const GEO_CANDIDATE_LIMIT: i64 = 500;

pub struct RideRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    driver_id: Uuid,
    airport_id: Uuid,
    direction: String,
    home_address: Option<String>,
    home_postcode: String,
    home_city: String,
    home_lon: f64,
    home_lat: f64,
    departure_at: DateTime<Utc>,
    seats_total: i32,
    seats_left: i32,
    luggage_total: i32,
    luggage_left: i32,
    price_per_seat: i64,
    status: String,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const RIDE_COLUMNS: &str = "id, driver_id, airport_id, direction, home_address, home_postcode, \
     home_city, home_lon, home_lat, departure_at, seats_total, seats_left, luggage_total, \
     luggage_left, price_per_seat, status, comment, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RideSearchRow {
    id: Uuid,
    driver_id: Uuid,
    display_name: String,
    rating_mean: f64,
    rating_count: i64,
    airport_id: Uuid,
    direction: String,
    home_city: String,
    home_postcode: String,
    departure_at: DateTime<Utc>,
    seats_left: i32,
    luggage_left: i32,
    price_per_seat: i64,
}

fn map_ride(row: RideRow) -> StoreResult<Ride> {
    let direction = RideDirection::parse(&row.direction)
        .ok_or_else(|| StoreError::Decode(format!("unknown ride direction {}", row.direction)))?;
    let status = RideStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Decode(format!("unknown ride status {}", row.status)))?;
    Ok(Ride {
        id: row.id,
        driver_id: row.driver_id,
        airport_id: row.airport_id,
        direction,
        home: HomeLocation {
            address: row.home_address,
            postcode: row.home_postcode,
            city: row.home_city,
            point: GeoPoint::new(row.home_lon, row.home_lat),
        },
        departure_at: row.departure_at,
        seats_total: row.seats_total,
        seats_left: row.seats_left,
        luggage_total: row.luggage_total,
        luggage_left: row.luggage_left,
        price_per_seat: row.price_per_seat,
        status,
        comment: row.comment,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn map_search_row(row: RideSearchRow) -> StoreResult<RideSearchItem> {
    let direction = RideDirection::parse(&row.direction)
        .ok_or_else(|| StoreError::Decode(format!("unknown ride direction {}", row.direction)))?;
    Ok(RideSearchItem {
        id: row.id,
        driver_id: row.driver_id,
        driver_name: row.display_name,
        driver_rating_mean: row.rating_mean,
        driver_rating_count: row.rating_count,
        airport_id: row.airport_id,
        direction,
        home_city: row.home_city,
        home_postcode: row.home_postcode,
        departure_at: row.departure_at,
        seats_left: row.seats_left,
        luggage_left: row.luggage_left,
        price_per_seat: row.price_per_seat,
        distance_m: None,
    })
}

pub struct NewRide {
    pub driver_id: Uuid,
    pub airport_id: Uuid,
    pub direction: RideDirection,
    pub home: HomeLocation,
    pub departure_at: DateTime<Utc>,
    pub seats_total: i32,
    pub luggage_total: i32,
    pub price_per_seat: i64,
    pub comment: Option<String>,
    /// Ordered waypoints; a two-point home/airport fallback is fine.
    pub route: Vec<GeoPoint>,
}

impl RideRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewRide) -> StoreResult<Ride> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO rides (id, driver_id, airport_id, direction, home_address, \
                home_postcode, home_city, home_lon, home_lat, departure_at, seats_total, \
                seats_left, luggage_total, luggage_left, price_per_seat, comment) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, $12, $12, $13, $14) \
             RETURNING {RIDE_COLUMNS}"
        );
        let row: RideRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(new.driver_id)
            .bind(new.airport_id)
            .bind(new.direction.as_str())
            .bind(&new.home.address)
            .bind(&new.home.postcode)
            .bind(&new.home.city)
            .bind(new.home.point.lon)
            .bind(new.home.point.lat)
            .bind(new.departure_at)
            .bind(new.seats_total)
            .bind(new.luggage_total)
            .bind(new.price_per_seat)
            .bind(&new.comment)
            .fetch_one(&mut *tx)
            .await?;

        let points = serde_json::to_value(&new.route)
            .map_err(|e| StoreError::Decode(format!("route: {e}")))?;
        sqlx::query("INSERT INTO ride_routes (ride_id, points) VALUES ($1, $2)")
            .bind(id)
            .bind(points)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        map_ride(row)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let sql = format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1");
        let row: Option<RideRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(map_ride).transpose()
    }

    pub async fn get_route(&self, ride_id: Uuid) -> StoreResult<Option<Vec<GeoPoint>>> {
        let points: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT points FROM ride_routes WHERE ride_id = $1")
                .bind(ride_id)
                .fetch_optional(&self.pool)
                .await?;
        points
            .map(|value| {
                serde_json::from_value(value).map_err(|e| StoreError::Decode(format!("route: {e}")))
            })
            .transpose()
    }

    /// Driver-side edit of the mutable fields, only while the ride is
    /// still active.
    pub async fn update(
        &self,
        id: Uuid,
        driver_id: Uuid,
        price_per_seat: Option<i64>,
        comment: Option<&str>,
        departure_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Ride>> {
        let sql = format!(
            "UPDATE rides SET \
                price_per_seat = COALESCE($3, price_per_seat), \
                comment = COALESCE($4, comment), \
                departure_at = COALESCE($5, departure_at), \
                updated_at = NOW() \
             WHERE id = $1 AND driver_id = $2 AND status = 'active' \
             RETURNING {RIDE_COLUMNS}"
        );
        let row: Option<RideRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(driver_id)
            .bind(price_per_seat)
            .bind(comment)
            .bind(departure_at)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_ride).transpose()
    }

    pub async fn my_rides(&self, driver_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<Ride>> {
        let sql = format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE driver_id = $1 \
             ORDER BY departure_at DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<RideRow> = sqlx::query_as(&sql)
            .bind(driver_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_ride).collect()
    }

    /// Attribute-filtered search ordered by departure; pickup-point
    /// searches re-rank by geodesic distance to the stored route.
    pub async fn search(
        &self,
        params: &RideSearchParams,
        now: DateTime<Utc>,
    ) -> StoreResult<(Vec<RideSearchItem>, i64)> {
        let (day_filter, day_start, day_end) = match params.date {
            Some(date) => {
                let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
                (true, start, start + chrono::Duration::days(1))
            }
            None => (false, now, now),
        };
        let direction = params.direction.map(|d| d.as_str()).unwrap_or("");
        let min_seats = params.min_seats.unwrap_or(1).max(1);

        let predicate = "FROM rides r JOIN users u ON u.id = r.driver_id \
             WHERE r.airport_id = $1 \
               AND r.status = 'active' \
               AND ($2 = '' OR r.direction = $2) \
               AND (NOT $3 OR (r.departure_at >= $4 AND r.departure_at < $5)) \
               AND ($3 OR r.departure_at > $6) \
               AND r.seats_left >= $7";

        match params.pickup {
            None => {
                let sql = format!(
                    "SELECT r.id, r.driver_id, u.display_name, u.rating_mean, u.rating_count, \
                        r.airport_id, r.direction, r.home_city, r.home_postcode, r.departure_at, \
                        r.seats_left, r.luggage_left, r.price_per_seat \
                     {predicate} ORDER BY r.departure_at ASC LIMIT $8 OFFSET $9"
                );
                let rows: Vec<RideSearchRow> = sqlx::query_as(&sql)
                    .bind(params.airport_id)
                    .bind(direction)
                    .bind(day_filter)
                    .bind(day_start)
                    .bind(day_end)
                    .bind(now)
                    .bind(min_seats)
                    .bind(params.page.limit)
                    .bind(params.page.offset())
                    .fetch_all(&self.pool)
                    .await?;

                let count_sql = format!("SELECT COUNT(*) {predicate}");
                let total: i64 = sqlx::query_scalar(&count_sql)
                    .bind(params.airport_id)
                    .bind(direction)
                    .bind(day_filter)
                    .bind(day_start)
                    .bind(day_end)
                    .bind(now)
                    .bind(min_seats)
                    .fetch_one(&self.pool)
                    .await?;

                let items = rows
                    .into_iter()
                    .map(map_search_row)
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok((items, total))
            }
            Some(pickup) => {
                let sql = format!(
                    "SELECT r.id, r.driver_id, u.display_name, u.rating_mean, u.rating_count, \
                        r.airport_id, r.direction, r.home_city, r.home_postcode, r.departure_at, \
                        r.seats_left, r.luggage_left, r.price_per_seat \
                     {predicate} ORDER BY r.departure_at ASC LIMIT $8"
                );
                let rows: Vec<RideSearchRow> = sqlx::query_as(&sql)
                    .bind(params.airport_id)
                    .bind(direction)
                    .bind(day_filter)
                    .bind(day_start)
                    .bind(day_end)
                    .bind(now)
                    .bind(min_seats)
                    .bind(GEO_CANDIDATE_LIMIT)
                    .fetch_all(&self.pool)
                    .await?;

                let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
                let routes = self.routes_for(&ids).await?;

                let mut ranked: Vec<RideSearchItem> = Vec::new();
                for row in rows {
                    let distance = routes
                        .get(&row.id)
                        .and_then(|route| polyline_distance_m(pickup, route));
                    if let Some(d) = distance {
                        if d <= params.radius_m {
                            let mut item = map_search_row(row)?;
                            item.distance_m = Some(d);
                            ranked.push(item);
                        }
                    }
                }
                ranked.sort_by(|a, b| {
                    a.distance_m
                        .unwrap_or(f64::MAX)
                        .total_cmp(&b.distance_m.unwrap_or(f64::MAX))
                });

                let total = ranked.len() as i64;
                let start = (params.page.offset() as usize).min(ranked.len());
                let end = (start + params.page.limit as usize).min(ranked.len());
                Ok((ranked[start..end].to_vec(), total))
            }
        }
    }

    async fn routes_for(&self, ride_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<GeoPoint>>> {
        if ride_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, serde_json::Value)> =
            sqlx::query_as("SELECT ride_id, points FROM ride_routes WHERE ride_id = ANY($1)")
                .bind(ride_ids)
                .fetch_all(&self.pool)
                .await?;
        let mut routes = HashMap::with_capacity(rows.len());
        for (ride_id, value) in rows {
            let points: Vec<GeoPoint> = serde_json::from_value(value)
                .map_err(|e| StoreError::Decode(format!("route: {e}")))?;
            routes.insert(ride_id, points);
        }
        Ok(routes)
    }
}

// ============================================================================
// Capacity operations (composable inside transactions)
// ============================================================================

/// Conditional decrement; the WHERE clause is the whole concurrency story:
/// two reservations of the last seat cannot both match.
pub async fn try_reserve<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    ride_id: Uuid,
    seats: i32,
    luggage: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE rides SET seats_left = seats_left - $2, luggage_left = luggage_left - $3, \
            updated_at = NOW() \
         WHERE id = $1 AND status = 'active' AND seats_left >= $2 AND luggage_left >= $3",
    )
    .bind(ride_id)
    .bind(seats)
    .bind(luggage)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Unconditional increment, clamped to the totals.
pub async fn release<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    ride_id: Uuid,
    seats: i32,
    luggage: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE rides SET \
            seats_left = LEAST(seats_total, seats_left + $2), \
            luggage_left = LEAST(luggage_total, luggage_left + $3), \
            updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(ride_id)
    .bind(seats)
    .bind(luggage)
    .execute(exec)
    .await?;
    Ok(())
}

/// Flips an active ride to cancelled, blocking all further reservations.
pub async fn freeze<'e>(exec: impl sqlx::PgExecutor<'e>, ride_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE rides SET status = 'cancelled', updated_at = NOW() \
         WHERE id = $1 AND status = 'active'",
    )
    .bind(ride_id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Row-locked fetch for flows that must read price/driver consistently.
pub async fn lock_ride(
    conn: &mut sqlx::PgConnection,
    ride_id: Uuid,
) -> StoreResult<Option<Ride>> {
    let sql = format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1 FOR UPDATE");
    let row: Option<RideRow> = sqlx::query_as(&sql).bind(ride_id).fetch_optional(conn).await?;
    row.map(map_ride).transpose()
}
