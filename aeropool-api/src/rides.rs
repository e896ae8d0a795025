use aeropool_booking::transition::validate_ride_cancel;
use aeropool_core::geo::GeoPoint;
use aeropool_domain::booking::Booking;
use aeropool_domain::notification::NotificationPayload;
use aeropool_domain::ride::{validate_new_ride, HomeLocation, Ride, RideDirection};
use aeropool_domain::search::{Page, Pagination, RideSearchItem, RideSearchParams};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bookings::refund_cancelled_booking;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::response::{ok, ok_paginated, ok_with_message, ApiResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/rides/search", get(search_rides))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/rides", post(create_ride))
        .route("/rides/my-rides", get(my_rides))
        .route("/rides/route-preview", post(route_preview))
        .route("/rides/:id", get(get_ride).patch(update_ride).delete(cancel_ride))
        .route("/rides/:id/bookings", get(ride_bookings).post(crate::bookings::create_booking))
        .route("/rides/:id/route", get(get_ride_route))
}

#[derive(Debug, Deserialize)]
struct CreateRideRequest {
    airport_id: Uuid,
    direction: String,
    home: HomeInput,
    departure_at: DateTime<Utc>,
    seats_total: i32,
    #[serde(default)]
    luggage_total: i32,
    price_per_seat: i64,
    comment: Option<String>,
    /// Optional precomputed waypoints from the routing edge; defaults to
    /// the two-point home/airport fallback.
    route: Option<Vec<GeoPoint>>,
}

#[derive(Debug, Deserialize)]
struct HomeInput {
    address: Option<String>,
    postcode: String,
    city: String,
    lat: f64,
    lon: f64,
}

async fn create_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateRideRequest>,
) -> Result<Json<ApiResponse<Ride>>, AppError> {
    if !user.role.can_drive() {
        return Err(AppError::Permission("only drivers may publish rides".into()));
    }
    let direction = RideDirection::parse(&req.direction)
        .ok_or_else(|| AppError::Validation(format!("unknown direction {}", req.direction)))?;
    let home_point = GeoPoint::new(req.home.lon, req.home.lat);
    let now = state.clock.now();
    validate_new_ride(
        req.departure_at,
        now,
        req.seats_total,
        req.luggage_total,
        req.price_per_seat,
        home_point,
    )
    .map_err(|e| AppError::Validation(e.to_string()))?;

    let airport = state
        .airports
        .get(req.airport_id)
        .await?
        .ok_or(AppError::NotFound("airport"))?;

    let route = match req.route {
        Some(route) if route.len() >= 2 => route,
        // Two-point fallback; a routing provider can replace it later.
        _ => vec![home_point, airport.location],
    };

    let ride = state
        .rides
        .create(aeropool_store::ride_repo::NewRide {
            driver_id: user.id,
            airport_id: airport.id,
            direction,
            home: HomeLocation {
                address: req.home.address,
                postcode: req.home.postcode,
                city: req.home.city,
                point: home_point,
            },
            departure_at: req.departure_at,
            seats_total: req.seats_total,
            luggage_total: req.luggage_total,
            price_per_seat: req.price_per_seat,
            comment: req.comment,
            route,
        })
        .await?;

    state.cache.del_glob("search:rides:*").await;
    Ok(ok(ride))
}

#[derive(Debug, Deserialize)]
struct RideSearchQuery {
    airport_id: Uuid,
    direction: Option<String>,
    date: Option<NaiveDate>,
    min_seats: Option<i32>,
    pickup_lat: Option<f64>,
    pickup_lon: Option<f64>,
    radius: Option<f64>,
    page: Option<i64>,
    limit: Option<i64>,
}

async fn search_rides(
    State(state): State<AppState>,
    Query(query): Query<RideSearchQuery>,
) -> Result<Json<ApiResponse<Vec<RideSearchItem>>>, AppError> {
    let direction = match query.direction.as_deref() {
        None => None,
        Some(d) => Some(
            RideDirection::parse(d)
                .ok_or_else(|| AppError::Validation(format!("unknown direction {d}")))?,
        ),
    };
    let pickup = match (query.pickup_lat, query.pickup_lon) {
        (Some(lat), Some(lon)) => {
            let point = GeoPoint::new(lon, lat);
            if !point.is_valid() {
                return Err(AppError::Validation("pickup coordinates out of range".into()));
            }
            Some(point)
        }
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "pickup_lat and pickup_lon must be provided together".into(),
            ))
        }
    };

    let params = RideSearchParams {
        airport_id: query.airport_id,
        direction,
        date: query.date,
        min_seats: query.min_seats,
        pickup,
        radius_m: query.radius.unwrap_or(state.rules.search_radius_m),
        page: Page::clamped(query.page, query.limit),
    };

    // Search responses are cached briefly; mutations blow the keys away.
    let cache_key = search_cache_key(&params);
    if let Some(cached) = state.cache.get(&cache_key).await {
        if let Ok(hit) = serde_json::from_str::<CachedSearch>(&cached) {
            return Ok(ok_paginated(hit.items, Pagination::new(params.page, hit.total)));
        }
    }

    let (items, total) = state.rides.search(&params, state.clock.now()).await?;
    let payload = CachedSearch { items: items.clone(), total };
    if let Ok(serialized) = serde_json::to_string(&payload) {
        state
            .cache
            .set_ex(&cache_key, &serialized, state.rules.search_cache_secs)
            .await;
    }
    Ok(ok_paginated(items, Pagination::new(params.page, total)))
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedSearch {
    items: Vec<RideSearchItem>,
    total: i64,
}

fn search_cache_key(params: &RideSearchParams) -> String {
    format!(
        "search:rides:{}:{}:{}:{}:{}:{}:{}:{}",
        params.airport_id,
        params.direction.map(|d| d.as_str()).unwrap_or("any"),
        params.date.map(|d| d.to_string()).unwrap_or_else(|| "any".into()),
        params.min_seats.unwrap_or(1),
        params
            .pickup
            .map(|p| format!("{:.4},{:.4}", p.lat, p.lon))
            .unwrap_or_else(|| "none".into()),
        params.radius_m as i64,
        params.page.page,
        params.page.limit,
    )
}

async fn get_ride(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Ride>>, AppError> {
    let ride = state.rides.get(id).await?.ok_or(AppError::NotFound("ride"))?;
    Ok(ok(ride))
}

/// Route polyline, loaded on demand only.
async fn get_ride_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<GeoPoint>>>, AppError> {
    let route = state.rides.get_route(id).await?.ok_or(AppError::NotFound("ride"))?;
    Ok(ok(route))
}

#[derive(Debug, Deserialize)]
struct UpdateRideRequest {
    price_per_seat: Option<i64>,
    comment: Option<String>,
    departure_at: Option<DateTime<Utc>>,
}

async fn update_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRideRequest>,
) -> Result<Json<ApiResponse<Ride>>, AppError> {
    if req.price_per_seat.is_some_and(|p| p < 0) {
        return Err(AppError::Validation("price_per_seat must not be negative".into()));
    }
    if let Some(departure_at) = req.departure_at {
        if departure_at <= state.clock.now() {
            return Err(AppError::Validation("departure must be in the future".into()));
        }
    }
    let ride = state
        .rides
        .update(id, user.id, req.price_per_seat, req.comment.as_deref(), req.departure_at)
        .await?
        .ok_or_else(|| AppError::State("ride is not editable".into()))?;
    state.cache.del_glob("search:rides:*").await;
    Ok(ok(ride))
}

async fn my_rides(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Ride>>>, AppError> {
    let page = Page::clamped(page.page, page.limit);
    let rides = state.rides.my_rides(user.id, page.limit, page.offset()).await?;
    Ok(ok(rides))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// DELETE /rides/:id — driver cancels the whole trip.
///
/// Allowed only >12h before departure. Cancellation commits first; refunds
/// run per booking and report partial success rather than rolling back.
async fn cancel_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let ride = state.rides.get(id).await?.ok_or(AppError::NotFound("ride"))?;
    if ride.driver_id != user.id {
        return Err(AppError::Permission("only the driver may cancel this ride".into()));
    }
    let now = state.clock.now();
    validate_ride_cancel(now, ride.departure_at)?;

    let cancelled = aeropool_store::flows::cancel_ride_phase1(&state.pool, id, user.id).await?;
    state.cache.del_glob("search:rides:*").await;

    let mut refund_failures = 0usize;
    for booking in &cancelled {
        if booking.is_paid() && !refund_cancelled_booking(&state, booking, ride.driver_id).await {
            refund_failures += 1;
        }
        state
            .notifier
            .emit(
                booking.passenger_id,
                NotificationPayload::RideCancelled {
                    ride_id: ride.id,
                    booking_id: booking.id,
                    refunded: booking.is_paid(),
                },
            )
            .await;
    }

    let summary = serde_json::json!({
        "cancelled_bookings": cancelled.len(),
        "refund_failures": refund_failures,
    });
    if refund_failures > 0 {
        return Ok(ok_with_message(
            summary,
            "ride cancelled; some refunds failed and were queued for manual review",
        ));
    }
    Ok(ok_with_message(summary, "ride cancelled"))
}

#[derive(Debug, Serialize)]
struct RideBookingView {
    #[serde(flatten)]
    booking: Booking,
    passenger_name: String,
}

async fn ride_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<RideBookingView>>>, AppError> {
    let ride = state.rides.get(id).await?.ok_or(AppError::NotFound("ride"))?;
    if ride.driver_id != user.id {
        return Err(AppError::Permission("only the driver may list these bookings".into()));
    }
    let bookings = state.bookings.list_for_ride(id).await?;
    Ok(ok(bookings
        .into_iter()
        .map(|(booking, passenger_name)| RideBookingView { booking, passenger_name })
        .collect()))
}

#[derive(Debug, Deserialize)]
struct RoutePreviewRequest {
    from: GeoPoint,
    to: GeoPoint,
}

/// External routing providers are out of scope; the preview is the
/// straight two-point polyline with its great-circle length.
async fn route_preview(
    State(_state): State<AppState>,
    Json(req): Json<RoutePreviewRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    if !req.from.is_valid() || !req.to.is_valid() {
        return Err(AppError::Validation("coordinates out of range".into()));
    }
    let distance = aeropool_core::geo::haversine_m(req.from, req.to);
    Ok(ok(serde_json::json!({
        "route": [req.from, req.to],
        "distance_m": distance,
    })))
}
