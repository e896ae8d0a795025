use aeropool_domain::booking::BookingStatus;
use aeropool_domain::notification::NotificationPayload;
use aeropool_domain::rating::{is_rateable, rateable_from, valid_stars, Rating, RatingType};
use aeropool_store::rating_repo::{PendingRating, RatingStats};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/ratings", post(create_rating))
        .route("/ratings/pending", get(pending_ratings))
        .route("/ratings/can-rate/:booking_id", get(can_rate))
        .route("/ratings/stats/:user_id", get(rating_stats))
}

#[derive(Debug, Deserialize)]
struct CreateRatingBody {
    booking_id: Uuid,
    stars: i32,
    comment: Option<String>,
}

/// POST /ratings — guarded by the 30-minute window, accepted-booking
/// membership and per-(booking, author) uniqueness.
async fn create_rating(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateRatingBody>,
) -> Result<Json<ApiResponse<Rating>>, AppError> {
    if !valid_stars(body.stars) {
        return Err(AppError::Validation("stars must be between 1 and 5".into()));
    }

    let booking = state
        .bookings
        .get(body.booking_id)
        .await?
        .ok_or(AppError::NotFound("booking"))?;
    if booking.status != BookingStatus::Accepted {
        return Err(AppError::State("only accepted bookings can be rated".into()));
    }
    let ride = state.rides.get(booking.ride_id).await?.ok_or(AppError::NotFound("ride"))?;

    let now = state.clock.now();
    if !is_rateable(ride.departure_at, now) {
        return Err(AppError::State("rating opens 30 minutes after departure".into()));
    }

    let (to_user_id, rating_type) = if user.id == booking.passenger_id {
        (ride.driver_id, RatingType::PassengerToDriver)
    } else if user.id == ride.driver_id {
        (booking.passenger_id, RatingType::DriverToPassenger)
    } else {
        return Err(AppError::Permission("not a party to this booking".into()));
    };

    if state.ratings.exists(booking.id, user.id).await? {
        return Err(AppError::Conflict("already rated".into()));
    }

    let rating = state
        .ratings
        .create(
            user.id,
            to_user_id,
            booking.id,
            ride.id,
            rating_type,
            body.stars,
            body.comment.as_deref(),
        )
        .await?;

    state
        .notifier
        .emit(
            to_user_id,
            NotificationPayload::RatingReceived { rating_id: rating.id, stars: rating.stars },
        )
        .await;

    Ok(ok(rating))
}

async fn pending_ratings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<PendingRating>>>, AppError> {
    let pending = state.ratings.pending_for_user(user.id, state.clock.now()).await?;
    Ok(ok(pending))
}

#[derive(Debug, Serialize)]
struct CanRateView {
    can_rate: bool,
    reason: Option<String>,
    rateable_from: Option<chrono::DateTime<chrono::Utc>>,
}

async fn can_rate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CanRateView>>, AppError> {
    let booking = state.bookings.get(booking_id).await?.ok_or(AppError::NotFound("booking"))?;
    let ride = state.rides.get(booking.ride_id).await?.ok_or(AppError::NotFound("ride"))?;

    if user.id != booking.passenger_id && user.id != ride.driver_id {
        return Err(AppError::Permission("not a party to this booking".into()));
    }

    let opens_at = rateable_from(ride.departure_at);
    let view = if booking.status != BookingStatus::Accepted {
        CanRateView {
            can_rate: false,
            reason: Some("only accepted bookings can be rated".into()),
            rateable_from: None,
        }
    } else if !is_rateable(ride.departure_at, state.clock.now()) {
        CanRateView {
            can_rate: false,
            reason: Some("rating opens 30 minutes after departure".into()),
            rateable_from: Some(opens_at),
        }
    } else if state.ratings.exists(booking.id, user.id).await? {
        CanRateView { can_rate: false, reason: Some("already rated".into()), rateable_from: Some(opens_at) }
    } else {
        CanRateView { can_rate: true, reason: None, rateable_from: Some(opens_at) }
    };
    Ok(ok(view))
}

async fn rating_stats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RatingStats>>, AppError> {
    let stats = state.ratings.stats_for_user(user_id).await?;
    Ok(ok(stats))
}
