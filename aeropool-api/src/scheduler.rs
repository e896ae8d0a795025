use aeropool_domain::notification::NotificationPayload;
use aeropool_domain::rating::{RatingType, RATEABLE_DELAY_MINUTES};
use aeropool_store::rating_repo;
use chrono::Duration;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{error, info};

use crate::state::AppState;

/// How often the rating scheduler wakes up. The query window below is
/// sized to the same five minutes so a departure is seen exactly once.
const RATING_TICK_SECS: u64 = 300;

/// Marks freshly rateable rides: every five minutes, rides whose
/// departure fell 30-35 minutes ago get their rate_driver /
/// rate_passenger prompts, deduplicated by the store.
pub fn start_rating_scheduler(state: AppState) {
    tokio::spawn(async move {
        let mut tick = interval(TokioDuration::from_secs(RATING_TICK_SECS));
        loop {
            tick.tick().await;
            if let Err(e) = rating_tick(&state).await {
                error!("rating scheduler tick failed: {e}");
            }
        }
    });
}

async fn rating_tick(state: &AppState) -> anyhow::Result<()> {
    let now = state.clock.now();
    let window_end = now - Duration::minutes(RATEABLE_DELAY_MINUTES);
    let window_start = window_end - Duration::seconds(RATING_TICK_SECS as i64);

    let bookings = rating_repo::rateable_window_bookings(&state.pool, window_start, window_end).await?;
    if bookings.is_empty() {
        return Ok(());
    }
    info!("rating scheduler: {} bookings entered the rateable window", bookings.len());

    for booking in bookings {
        if !rating_repo::rating_exists_for(&state.pool, booking.booking_id, RatingType::PassengerToDriver)
            .await?
        {
            state
                .notifier
                .emit(
                    booking.passenger_id,
                    NotificationPayload::RateDriver {
                        ride_id: booking.ride_id,
                        booking_id: booking.booking_id,
                        driver_id: booking.driver_id,
                    },
                )
                .await;
        }
        if !rating_repo::rating_exists_for(&state.pool, booking.booking_id, RatingType::DriverToPassenger)
            .await?
        {
            state
                .notifier
                .emit(
                    booking.driver_id,
                    NotificationPayload::RatePassenger {
                        ride_id: booking.ride_id,
                        booking_id: booking.booking_id,
                        passenger_id: booking.passenger_id,
                    },
                )
                .await;
        }
    }
    Ok(())
}

/// Sweeps pending ride requests past their deadline to `expired`.
pub fn start_expiry_sweep(state: AppState) {
    tokio::spawn(async move {
        let mut tick =
            interval(TokioDuration::from_secs(aeropool_request::expiry::SWEEP_INTERVAL_SECS));
        loop {
            tick.tick().await;
            match state.requests.expire_due(state.clock.now()).await {
                Ok(expired) if !expired.is_empty() => {
                    info!("expired {} lapsed ride requests", expired.len());
                }
                Ok(_) => {}
                Err(e) => error!("request expiry sweep failed: {e}"),
            }
        }
    });
}
