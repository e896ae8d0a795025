use aeropool_booking::refund::plan_refund;
use aeropool_booking::transition::{
    validate_seat_change, validate_transition, Actor, CapacityEffect,
};
use aeropool_domain::booking::{Booking, BookingStatus, PaymentMethod, RefundReason, Stop};
use aeropool_domain::notification::NotificationPayload;
use aeropool_domain::search::Page;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Extension, Json, Router,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::response::{ok, ok_with_message, ApiResponse};
use crate::rides::PageQuery;
use crate::state::AppState;

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings/:id", patch(transition_booking))
        .route("/me/bookings", get(my_bookings))
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    seats: i32,
    #[serde(default)]
    luggage: i32,
    pickup: Option<Stop>,
    dropoff: Option<Stop>,
}

/// POST /rides/:id/bookings — a not-yet-paid claim.
///
/// Deliberately does NOT reserve capacity: several passengers may ask for
/// the same last seats and the driver picks. Capacity is only validated
/// against the current counts.
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(ride_id): Path<Uuid>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    if req.seats < 1 || req.luggage < 0 {
        return Err(AppError::Validation("seats must be >= 1 and luggage >= 0".into()));
    }
    let ride = state.rides.get(ride_id).await?.ok_or(AppError::NotFound("ride"))?;
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
    if state.bookings.exists_for(ride_id, user.id).await? {
        return Err(AppError::Conflict("you already have a booking on this ride".into()));
    }

    let mut conn = state.pool.acquire().await?;
    let booking = aeropool_store::booking_repo::insert_booking(
        &mut conn,
        aeropool_store::booking_repo::NewBooking {
            ride_id,
            passenger_id: user.id,
            seats: req.seats,
            luggage: req.luggage,
            status: BookingStatus::Pending,
            pickup: req.pickup,
            dropoff: req.dropoff,
            payment_status: aeropool_domain::booking::PaymentStatus::Unpaid,
            payment_method: PaymentMethod::None,
            amount: 0,
            psp_intent_id: None,
        },
    )
    .await?;

    let passenger_name = state
        .users
        .get(user.id)
        .await?
        .map(|u| u.display_name)
        .unwrap_or_else(|| user.email.clone());
    state
        .notifier
        .emit(
            ride.driver_id,
            NotificationPayload::BookingRequest {
                ride_id,
                booking_id: booking.id,
                passenger_name,
                seats: req.seats,
            },
        )
        .await;

    Ok(ok(booking))
}

#[derive(Debug, Deserialize)]
struct TransitionRequest {
    status: Option<String>,
    seats: Option<i32>,
    #[serde(default)]
    luggage: Option<i32>,
}

/// PATCH /bookings/:id — the transition matrix endpoint, plus the
/// pending-only seat resize.
async fn transition_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let booking = state.bookings.get(id).await?.ok_or(AppError::NotFound("booking"))?;
    let ride = state.rides.get(booking.ride_id).await?.ok_or(AppError::NotFound("ride"))?;

    let actor = if user.id == ride.driver_id {
        Actor::Driver
    } else if user.id == booking.passenger_id {
        Actor::Passenger
    } else {
        return Err(AppError::Permission("not a party to this booking".into()));
    };

    // Seat resize path, passenger-only while pending.
    if req.status.is_none() {
        let seats = req.seats.ok_or_else(|| {
            AppError::Validation("either status or seats must be provided".into())
        })?;
        if actor != Actor::Passenger {
            return Err(AppError::Permission("only the passenger may change seats".into()));
        }
        let luggage = req.luggage.unwrap_or(booking.luggage);
        validate_seat_change(booking.status, seats, luggage, ride.seats_left, ride.luggage_left)?;
        let updated = state
            .bookings
            .update_seats(id, user.id, seats, luggage)
            .await?
            .ok_or_else(|| AppError::State("booking is no longer pending".into()))?;
        return Ok(ok(updated));
    }

    let target = req.status.as_deref().unwrap();
    let target = BookingStatus::parse(target)
        .ok_or_else(|| AppError::Validation(format!("unknown status {target}")))?;
    let now = state.clock.now();
    let effect = validate_transition(booking.status, target, actor, now, ride.departure_at)?;

    let updated = match (target, effect) {
        (BookingStatus::Accepted, CapacityEffect::Reserve) => {
            let accepted =
                aeropool_store::flows::driver_accept_booking(&state.pool, booking.id).await?;
            state
                .notifier
                .emit(
                    booking.passenger_id,
                    NotificationPayload::BookingAccepted { ride_id: ride.id, booking_id: booking.id },
                )
                .await;
            state.cache.del_glob("search:rides:*").await;
            accepted
        }
        (BookingStatus::Rejected, CapacityEffect::None) => {
            let flipped = aeropool_store::booking_repo::set_status_if(
                &state.pool,
                booking.id,
                &[BookingStatus::Pending],
                BookingStatus::Rejected,
            )
            .await?;
            if !flipped {
                return Err(AppError::State("booking is no longer pending".into()));
            }
            state
                .notifier
                .emit(
                    booking.passenger_id,
                    NotificationPayload::BookingRejected { ride_id: ride.id, booking_id: booking.id },
                )
                .await;
            state.bookings.get(booking.id).await?.ok_or(AppError::NotFound("booking"))?
        }
        (BookingStatus::Cancelled, _) => {
            return cancel_booking(state, booking, ride.driver_id).await;
        }
        _ => return Err(AppError::State("unsupported transition".into())),
    };

    Ok(ok(updated))
}

/// Passenger cancellation: the flip commits first; the 100 % refund runs
/// after and can only degrade the message, never the cancellation.
async fn cancel_booking(
    state: AppState,
    booking: Booking,
    driver_id: Uuid,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let snapshot = aeropool_store::flows::cancel_booking_phase1(
        &state.pool,
        booking.id,
        RefundReason::PassengerCancelled,
    )
    .await?;
    let Some(snapshot) = snapshot else {
        // Raced with another cancellation: converge on the stored state.
        let current = state.bookings.get(booking.id).await?.ok_or(AppError::NotFound("booking"))?;
        return Ok(ok(current));
    };

    if snapshot.releases_capacity_on_cancel() {
        state.cache.del_glob("search:rides:*").await;
    }

    let refunded = if snapshot.is_paid() {
        refund_cancelled_booking(&state, &snapshot, driver_id).await
    } else {
        true
    };

    state
        .notifier
        .emit(
            driver_id,
            NotificationPayload::BookingCancelled {
                ride_id: snapshot.ride_id,
                booking_id: snapshot.id,
                by_driver: false,
            },
        )
        .await;

    let current = state.bookings.get(booking.id).await?.ok_or(AppError::NotFound("booking"))?;
    if !refunded {
        return Ok(ok_with_message(
            current,
            "booking cancelled; the refund failed and was queued for manual review",
        ));
    }
    Ok(ok(current))
}

/// Executes the refund plan for a cancelled, paid booking. Returns false
/// (after flagging the row for reconciliation) when any step fails.
pub(crate) async fn refund_cancelled_booking(
    state: &AppState,
    booking: &Booking,
    driver_id: Uuid,
) -> bool {
    match try_refund(state, booking, driver_id).await {
        Ok(()) => true,
        Err(e) => {
            error!("refund for booking {} failed: {e}", booking.id);
            if let Err(mark_err) =
                aeropool_store::booking_repo::mark_refund_failed(&state.pool, booking.id).await
            {
                error!("failed to flag booking {} for reconciliation: {mark_err}", booking.id);
            }
            false
        }
    }
}

async fn try_refund(state: &AppState, booking: &Booking, driver_id: Uuid) -> Result<(), AppError> {
    let intent_had_transfer = match (&booking.payment_method, &booking.psp_intent_id) {
        (PaymentMethod::Card, Some(intent_id)) => {
            let intent = state
                .payments
                .gateway()
                .get_intent(intent_id)
                .await
                .map_err(|e| AppError::Payment(e.to_string()))?;
            intent.transfer_destination.is_some()
        }
        _ => false,
    };

    let plan = plan_refund(booking.payment_method, booking.amount, state.money.fees, intent_had_transfer);

    let refund_id = match (&plan.psp_refund, &booking.psp_intent_id) {
        (Some(opts), Some(intent_id)) => {
            let outcome = state.payments.refund(intent_id, opts.clone()).await?;
            Some(outcome.refund_id)
        }
        _ => None,
    };

    aeropool_store::flows::apply_refund_ledger(
        &state.pool,
        &state.money,
        booking,
        driver_id,
        &plan,
        refund_id.as_deref(),
    )
    .await?;
    Ok(())
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, AppError> {
    let page = Page::clamped(page.page, page.limit);
    let bookings = state.bookings.my_bookings(user.id, page.limit, page.offset()).await?;
    if bookings.iter().any(|b| b.refund_failed) {
        warn!("user {} has bookings awaiting refund reconciliation", user.id);
    }
    Ok(ok(bookings))
}
