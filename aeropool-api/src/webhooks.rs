use aeropool_booking::webhook::{parse_event, verify_signature, PspEvent};
use aeropool_store::flows::{self, WebhookOutcome};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tracing::{info, warn};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/stripe/webhook", post(stripe_webhook))
}

/// POST /stripe/webhook — the reconciliation entry point.
///
/// The signature is checked on the raw bytes before anything parses the
/// JSON; every handler is idempotent on the event id, so redeliveries and
/// out-of-order arrivals are acknowledged without effect.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    if verify_signature(&body, signature, &state.webhook_secret).is_err() {
        warn!("webhook rejected: bad signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let (event_id, event) = parse_event(&body).map_err(|e| {
        warn!("webhook rejected: {e}");
        StatusCode::BAD_REQUEST
    })?;

    let outcome = match &event {
        PspEvent::IntentSucceeded(intent) => {
            flows::webhook_intent_succeeded(&state.pool, &state.money, &event_id, intent).await
        }
        PspEvent::IntentFailed(intent) => {
            flows::webhook_intent_failed(&state.pool, &event_id, intent).await
        }
        PspEvent::TransferCreated(transfer) => {
            flows::webhook_transfer_created(&state.pool, &event_id, transfer).await
        }
        PspEvent::PayoutPaid(payout) => {
            flows::webhook_payout_paid(&state.pool, &event_id, payout).await
        }
        PspEvent::PayoutFailed(payout) => {
            flows::webhook_payout_failed(&state.pool, &state.money, &event_id, payout).await
        }
        PspEvent::AccountUpdated(account) => {
            flows::webhook_account_updated(&state.pool, &event_id, account).await
        }
        PspEvent::ChargeRefunded(charge) => {
            flows::webhook_charge_refunded(&state.pool, &state.money, &event_id, charge).await
        }
        PspEvent::Ignored(event_type) => {
            info!("webhook {event_id} ({event_type}) acknowledged without effect");
            return Ok(StatusCode::OK);
        }
    };

    match outcome {
        Ok(WebhookOutcome::Applied) => {
            info!("webhook {event_id} applied");
            Ok(StatusCode::OK)
        }
        Ok(WebhookOutcome::Duplicate) => {
            info!("webhook {event_id} already processed");
            Ok(StatusCode::OK)
        }
        Ok(WebhookOutcome::Skipped(reason)) => {
            info!("webhook {event_id} acknowledged: {reason}");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            // 5xx makes the provider redeliver; the idempotency journal
            // makes the retry safe.
            warn!("webhook {event_id} failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
