use aeropool_core::geo::GeoPoint;
use aeropool_domain::notification::NotificationPayload;
use aeropool_domain::request::{
    expiry_for, validate_new_request, Offer, RequestDirection, RequestLocation, RideRequest,
};
use aeropool_domain::search::{Page, Pagination, RequestSearchItem, RequestSearchParams};
use aeropool_request::rules;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::response::{ok, ok_message, ok_paginated, ApiResponse};
use crate::rides::PageQuery;
use crate::state::AppState;

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/ride-requests", post(create_request))
        .route("/ride-requests/available", get(available_requests))
        .route("/ride-requests/my-requests", get(my_requests))
        .route("/ride-requests/my-offers", get(my_offers))
        .route("/ride-requests/:id", get(get_request))
        .route("/ride-requests/:id/offer", post(make_offer).delete(withdraw_offer))
        .route("/ride-requests/:id/accept-offer", put(accept_offer))
        .route("/ride-requests/:id/accept-offer-with-payment", post(accept_offer))
        .route("/ride-requests/:id/reject-offer", put(reject_offer))
        .route("/ride-requests/:id/cancel", put(cancel_request))
}

#[derive(Debug, Deserialize)]
struct CreateRequestBody {
    airport_id: Uuid,
    direction: String,
    location: LocationInput,
    preferred_at: DateTime<Utc>,
    #[serde(default)]
    flexibility_minutes: i32,
    seats_needed: i32,
    #[serde(default)]
    luggage: i32,
    max_price_per_seat: Option<i64>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationInput {
    address: String,
    city: String,
    postcode: Option<String>,
    lat: f64,
    lon: f64,
}

async fn create_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateRequestBody>,
) -> Result<Json<ApiResponse<RideRequest>>, AppError> {
    let direction = RequestDirection::parse(&req.direction)
        .ok_or_else(|| AppError::Validation(format!("unknown direction {}", req.direction)))?;
    let point = GeoPoint::new(req.location.lon, req.location.lat);
    let now = state.clock.now();
    validate_new_request(req.preferred_at, now, req.seats_needed, req.luggage, req.max_price_per_seat, point)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let airport = state
        .airports
        .get(req.airport_id)
        .await?
        .ok_or(AppError::NotFound("airport"))?;

    let request = state
        .requests
        .create(aeropool_store::request_repo::NewRequest {
            passenger_id: user.id,
            airport_id: airport.id,
            direction,
            location: RequestLocation {
                address: req.location.address,
                city: req.location.city,
                postcode: req.location.postcode,
                point,
            },
            preferred_at: req.preferred_at,
            flexibility_minutes: req.flexibility_minutes.max(0),
            seats_needed: req.seats_needed,
            luggage: req.luggage,
            max_price_per_seat: req.max_price_per_seat,
            notes: req.notes,
            expires_at: expiry_for(req.preferred_at),
        })
        .await?;

    Ok(ok(request))
}

#[derive(Debug, Deserialize)]
struct AvailableQuery {
    airport_id: Option<Uuid>,
    direction: Option<String>,
    date: Option<NaiveDate>,
    city: Option<String>,
    pickup_lat: Option<f64>,
    pickup_lon: Option<f64>,
    radius: Option<f64>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// GET /ride-requests/available — the driver-side feed.
async fn available_requests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<ApiResponse<Vec<RequestSearchItem>>>, AppError> {
    if !user.role.can_drive() {
        return Err(AppError::Permission("only drivers may browse requests".into()));
    }
    let direction = match query.direction.as_deref() {
        None => None,
        Some(d) => Some(
            RequestDirection::parse(d)
                .ok_or_else(|| AppError::Validation(format!("unknown direction {d}")))?,
        ),
    };
    let pickup = match (query.pickup_lat, query.pickup_lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lon, lat)),
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "pickup_lat and pickup_lon must be provided together".into(),
            ))
        }
    };

    let params = RequestSearchParams {
        airport_id: query.airport_id,
        direction,
        date: query.date,
        city: query.city,
        pickup,
        radius_m: query.radius.unwrap_or(state.rules.search_radius_m),
        page: Page::clamped(query.page, query.limit),
    };
    let (items, total) = state.requests.search(&params, user.id, state.clock.now()).await?;
    Ok(ok_paginated(items, Pagination::new(params.page, total)))
}

async fn my_requests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<RequestWithOffers>>>, AppError> {
    let page = Page::clamped(page.page, page.limit);
    let requests = state.requests.my_requests(user.id, page.limit, page.offset()).await?;
    let mut out = Vec::with_capacity(requests.len());
    for request in requests {
        let offers = state.requests.offers_for_request(request.id).await?;
        out.push(RequestWithOffers { request, offers });
    }
    Ok(ok(out))
}

#[derive(Debug, Serialize)]
struct RequestWithOffers {
    #[serde(flatten)]
    request: RideRequest,
    offers: Vec<Offer>,
}

async fn my_offers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Offer>>>, AppError> {
    let page = Page::clamped(page.page, page.limit);
    let offers = state.requests.my_offers(user.id, page.limit, page.offset()).await?;
    Ok(ok(offers))
}

async fn get_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RequestWithOffers>>, AppError> {
    let request = state.requests.get(id).await?.ok_or(AppError::NotFound("request"))?;
    // Offers are visible to the owner and to bidding drivers.
    let offers = if request.passenger_id == user.id {
        state.requests.offers_for_request(id).await?
    } else {
        state
            .requests
            .offers_for_request(id)
            .await?
            .into_iter()
            .filter(|o| o.driver_id == user.id)
            .collect()
    };
    Ok(ok(RequestWithOffers { request, offers }))
}

#[derive(Debug, Deserialize)]
struct MakeOfferBody {
    price_per_seat: i64,
    ride_id: Option<Uuid>,
    message: Option<String>,
}

async fn make_offer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<MakeOfferBody>,
) -> Result<Json<ApiResponse<Offer>>, AppError> {
    if !user.role.can_drive() {
        return Err(AppError::Permission("only drivers may make offers".into()));
    }
    let request = state.requests.get(id).await?.ok_or(AppError::NotFound("request"))?;
    let now = state.clock.now();
    rules::validate_offer(&request, user.id, body.price_per_seat, now)?;

    if let Some(ride_id) = body.ride_id {
        let ride = state.rides.get(ride_id).await?.ok_or(AppError::NotFound("ride"))?;
        if ride.driver_id != user.id {
            return Err(AppError::Permission("offered ride belongs to another driver".into()));
        }
    }

    let offer = state
        .requests
        .insert_offer(id, user.id, body.ride_id, body.price_per_seat, body.message.as_deref())
        .await?;

    state
        .notifier
        .emit(
            request.passenger_id,
            NotificationPayload::OfferReceived {
                request_id: id,
                offer_id: offer.id,
                price_per_seat: offer.price_per_seat,
            },
        )
        .await;

    Ok(ok(offer))
}

async fn withdraw_offer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let withdrawn = state.requests.withdraw_offer(id, user.id).await?;
    if !withdrawn {
        return Err(AppError::NotFound("offer"));
    }
    Ok(ok_message("offer withdrawn"))
}

#[derive(Debug, Deserialize)]
struct AcceptOfferBody {
    offer_id: Uuid,
    /// "wallet" (default) or "card".
    #[serde(default)]
    payment_method: Option<String>,
    /// Required for the card path: a client-confirmed intent from
    /// /payments/create-offer-intent.
    intent_id: Option<String>,
}

/// Paid acceptance: money moves first, then the chosen offer flips to
/// accepted and every sibling to rejected, atomically.
async fn accept_offer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<AcceptOfferBody>,
) -> Result<Json<ApiResponse<RideRequest>>, AppError> {
    let now = state.clock.now();
    let method = body.payment_method.as_deref().unwrap_or("wallet");

    let accepted = match method {
        "wallet" => {
            aeropool_store::flows::accept_offer_with_wallet(
                &state.pool,
                &state.money,
                id,
                body.offer_id,
                user.id,
                now,
            )
            .await?
        }
        "card" => {
            let intent_id = body
                .intent_id
                .as_deref()
                .ok_or_else(|| AppError::Validation("intent_id is required for card payments".into()))?;
            let intent = state.payments.confirm_succeeded(intent_id).await?;
            let intent_request = intent
                .metadata
                .get("request_id")
                .and_then(|v| Uuid::parse_str(v).ok());
            let intent_offer = intent.metadata.get("offer_id").and_then(|v| Uuid::parse_str(v).ok());
            if intent_request != Some(id) || intent_offer != Some(body.offer_id) {
                return Err(AppError::State("intent does not match this offer".into()));
            }
            aeropool_store::flows::accept_offer_with_card(
                &state.pool,
                &state.money,
                id,
                body.offer_id,
                user.id,
                &intent,
                now,
            )
            .await?
        }
        other => {
            return Err(AppError::Validation(format!("unknown payment method {other}")));
        }
    };

    state
        .notifier
        .emit(
            user.id,
            NotificationPayload::RequestBooked { request_id: id, driver_id: accepted.offer.driver_id },
        )
        .await;
    state
        .notifier
        .emit(
            accepted.offer.driver_id,
            NotificationPayload::RequestBooked { request_id: id, driver_id: accepted.offer.driver_id },
        )
        .await;
    for rejected in &accepted.rejected {
        state
            .notifier
            .emit(
                rejected.driver_id,
                NotificationPayload::OfferRejected { request_id: id, offer_id: rejected.id },
            )
            .await;
    }

    let request = state.requests.get(id).await?.ok_or(AppError::NotFound("request"))?;
    Ok(ok(request))
}

#[derive(Debug, Deserialize)]
struct RejectOfferBody {
    offer_id: Uuid,
}

async fn reject_offer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectOfferBody>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let request = state.requests.get(id).await?.ok_or(AppError::NotFound("request"))?;
    let offer = state.requests.get_offer(body.offer_id).await?.ok_or(AppError::NotFound("offer"))?;
    rules::validate_rejection(&request, &offer, user.id)?;

    if !state.requests.reject_offer(offer.id).await? {
        return Err(AppError::State("offer is no longer pending".into()));
    }
    state
        .notifier
        .emit(
            offer.driver_id,
            NotificationPayload::OfferRejected { request_id: id, offer_id: offer.id },
        )
        .await;
    Ok(ok_message("offer rejected"))
}

async fn cancel_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let rejected = state
        .requests
        .cancel_request(id, user.id)
        .await?
        .ok_or_else(|| AppError::State("request is not pending or not yours".into()))?;

    for offer in &rejected {
        state
            .notifier
            .emit(
                offer.driver_id,
                NotificationPayload::OfferRejected { request_id: id, offer_id: offer.id },
            )
            .await;
    }
    Ok(ok_message("request cancelled"))
}
