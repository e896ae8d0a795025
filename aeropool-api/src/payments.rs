use aeropool_core::payment::CreateIntentRequest;
use aeropool_domain::booking::{Booking, Stop};
use aeropool_domain::notification::NotificationPayload;
use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/create-intent", post(create_intent))
        .route("/payments/create-offer-intent", post(create_offer_intent))
        .route("/payments/complete", post(complete_payment))
        .route("/payments/wallet", post(pay_with_wallet))
}

#[derive(Debug, Deserialize)]
struct CreateIntentReq {
    ride_id: Uuid,
    seats: i32,
    #[serde(default)]
    luggage: i32,
}

#[derive(Debug, Serialize)]
struct IntentView {
    intent_id: String,
    client_secret: Option<String>,
    amount: i64,
    currency: String,
}

/// POST /payments/create-intent — sizes the intent at price x seats and
/// splits to the driver's connected account when one is ready.
async fn create_intent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateIntentReq>,
) -> Result<Json<ApiResponse<IntentView>>, AppError> {
    if req.seats < 1 || req.luggage < 0 {
        return Err(AppError::Validation("seats must be >= 1 and luggage >= 0".into()));
    }
    let ride = state.rides.get(req.ride_id).await?.ok_or(AppError::NotFound("ride"))?;
    let now = state.clock.now();
    if ride.driver_id == user.id {
        return Err(AppError::State("drivers cannot book their own ride".into()));
    }
    if !ride.is_bookable(now) {
        return Err(AppError::State("ride is not open for booking".into()));
    }
    if !ride.has_capacity(req.seats, req.luggage) {
        return Err(AppError::Capacity("not enough seats or luggage space left".into()));
    }

    let amount = ride.price_per_seat * req.seats as i64;
    let driver = state.users.get(ride.driver_id).await?.ok_or(AppError::NotFound("driver"))?;

    let mut metadata = HashMap::new();
    metadata.insert("ride_id".to_string(), ride.id.to_string());
    metadata.insert("passenger_id".to_string(), user.id.to_string());
    metadata.insert("seats".to_string(), req.seats.to_string());
    metadata.insert("luggage".to_string(), req.luggage.to_string());

    let split_destination = driver
        .connected_account_id
        .filter(|_| driver.connected_account_ready);
    let application_fee = split_destination
        .as_ref()
        .map(|_| state.money.fees.split(amount).fee);

    let intent = state
        .payments
        .create_intent(CreateIntentRequest {
            amount,
            currency: state.money.currency.clone(),
            metadata,
            split_destination,
            application_fee,
        })
        .await?;

    Ok(ok(IntentView {
        intent_id: intent.id,
        client_secret: intent.client_secret,
        amount: intent.amount,
        currency: intent.currency,
    }))
}

#[derive(Debug, Deserialize)]
struct CreateOfferIntentReq {
    request_id: Uuid,
    offer_id: Uuid,
}

/// POST /payments/create-offer-intent — card path of paid offer
/// acceptance; the amount is offer price x requested seats.
async fn create_offer_intent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateOfferIntentReq>,
) -> Result<Json<ApiResponse<IntentView>>, AppError> {
    let request = state
        .requests
        .get(req.request_id)
        .await?
        .ok_or(AppError::NotFound("request"))?;
    let offer = state.requests.get_offer(req.offer_id).await?.ok_or(AppError::NotFound("offer"))?;

    let now = state.clock.now();
    let plan = aeropool_request::rules::plan_acceptance(&request, &offer, user.id, now)?;

    let driver = state.users.get(offer.driver_id).await?.ok_or(AppError::NotFound("driver"))?;
    let mut metadata = HashMap::new();
    metadata.insert("request_id".to_string(), request.id.to_string());
    metadata.insert("offer_id".to_string(), offer.id.to_string());
    metadata.insert("passenger_id".to_string(), user.id.to_string());

    let split_destination = driver
        .connected_account_id
        .filter(|_| driver.connected_account_ready);
    let application_fee = split_destination
        .as_ref()
        .map(|_| state.money.fees.split(plan.total).fee);

    let intent = state
        .payments
        .create_intent(CreateIntentRequest {
            amount: plan.total,
            currency: state.money.currency.clone(),
            metadata,
            split_destination,
            application_fee,
        })
        .await?;

    Ok(ok(IntentView {
        intent_id: intent.id,
        client_secret: intent.client_secret,
        amount: intent.amount,
        currency: intent.currency,
    }))
}

#[derive(Debug, Deserialize)]
struct CompletePaymentReq {
    intent_id: String,
}

/// POST /payments/complete — settles a client-confirmed card intent into
/// an accepted, paid booking.
///
/// If the seats are gone by now the money goes straight back: refund,
/// then a user-visible capacity error.
async fn complete_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CompletePaymentReq>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let intent = state.payments.confirm_succeeded(&req.intent_id).await?;

    let passenger_id = intent
        .metadata
        .get("passenger_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| AppError::State("intent metadata missing passenger_id".into()))?;
    if passenger_id != user.id {
        return Err(AppError::Permission("intent belongs to another user".into()));
    }

    let now = state.clock.now();
    match aeropool_store::flows::complete_card_booking(&state.pool, &state.money, &intent, now).await
    {
        Ok(booking) => {
            let ride = state.rides.get(booking.ride_id).await?;
            if let Some(ride) = ride {
                state
                    .notifier
                    .emit(
                        ride.driver_id,
                        NotificationPayload::BookingAccepted {
                            ride_id: ride.id,
                            booking_id: booking.id,
                        },
                    )
                    .await;
            }
            state.cache.del_glob("search:rides:*").await;
            Ok(ok(booking))
        }
        Err(e @ (aeropool_store::StoreError::InsufficientCapacity
        | aeropool_store::StoreError::Conflict(_))) => {
            // Money was taken but the booking cannot exist: give it back.
            if let Err(refund_err) = state
                .payments
                .refund(&intent.id, aeropool_core::payment::RefundOptions {
                    reverse_transfer: intent.transfer_destination.is_some(),
                    refund_application_fee: intent.transfer_destination.is_some(),
                })
                .await
            {
                error!("refund after failed completion of {} also failed: {refund_err}", intent.id);
            }
            match e {
                aeropool_store::StoreError::InsufficientCapacity => Err(AppError::Capacity(
                    "seats are no longer available; your payment was refunded".into(),
                )),
                _ => Err(AppError::Conflict(
                    "you already have a booking on this ride; the payment was refunded".into(),
                )),
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
struct WalletPaymentReq {
    ride_id: Uuid,
    seats: i32,
    #[serde(default)]
    luggage: i32,
    pickup: Option<Stop>,
    dropoff: Option<Stop>,
}

/// POST /payments/wallet — wallet-funded booking, settled entirely on the
/// internal ledger in one transaction.
async fn pay_with_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<WalletPaymentReq>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    if req.seats < 1 || req.luggage < 0 {
        return Err(AppError::Validation("seats must be >= 1 and luggage >= 0".into()));
    }
    let now = state.clock.now();
    let booking = aeropool_store::flows::pay_and_book_with_wallet(
        &state.pool,
        &state.money,
        req.ride_id,
        user.id,
        req.seats,
        req.luggage,
        req.pickup,
        req.dropoff,
        now,
    )
    .await?;

    if let Some(ride) = state.rides.get(booking.ride_id).await? {
        state
            .notifier
            .emit(
                ride.driver_id,
                NotificationPayload::BookingAccepted { ride_id: ride.id, booking_id: booking.id },
            )
            .await;
    }
    state.cache.del_glob("search:rides:*").await;

    Ok(ok(booking))
}
