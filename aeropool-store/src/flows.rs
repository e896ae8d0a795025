//! Cross-aggregate transactions: every flow here owns one database
//! transaction so a reader never observes money without its booking or a
//! booking without its seats.

use aeropool_booking::refund::RefundPlan;
use aeropool_booking::webhook::{
    AccountObject, ChargeObject, IntentObject, PayoutObject, TransferObject,
};
use aeropool_core::payment::PaymentIntent;
use aeropool_domain::booking::{
    Booking, BookingStatus, PaymentMethod, PaymentStatus, RefundReason, Stop,
};
use aeropool_domain::request::{Offer, RideRequest};
use aeropool_domain::wallet::{
    FeePolicy, Payout, PayoutMethod, ReferenceKind, TransactionKind, TransactionStatus,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::{
    booking_repo, ledger_repo, payout_repo, request_repo, ride_repo, user_repo, webhook_repo,
    StoreError, StoreResult,
};
use aeropool_request::rules;

/// Money parameters shared by every settling flow.
#[derive(Clone)]
pub struct MoneyCtx {
    pub fees: FeePolicy,
    pub currency: String,
}

fn meta_uuid(metadata: &HashMap<String, String>, key: &str) -> StoreResult<Uuid> {
    metadata
        .get(key)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| StoreError::State(format!("intent metadata missing {key}")))
}

fn meta_i32(metadata: &HashMap<String, String>, key: &str) -> StoreResult<i32> {
    metadata
        .get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| StoreError::State(format!("intent metadata missing {key}")))
}

async fn driver_connected_account(
    conn: &mut sqlx::PgConnection,
    driver_id: Uuid,
) -> StoreResult<Option<String>> {
    let account: Option<Option<String>> =
        sqlx::query_scalar("SELECT connected_account_id FROM users WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(conn)
            .await?;
    account.ok_or(StoreError::NotFound("driver"))
}

// ============================================================================
// Booking payment flows
// ============================================================================

/// Wallet payment is authoritative on our side: debit, reserve, book and
/// credit all commit or none do.
#[allow(clippy::too_many_arguments)]
pub async fn pay_and_book_with_wallet(
    pool: &PgPool,
    ctx: &MoneyCtx,
    ride_id: Uuid,
    passenger_id: Uuid,
    seats: i32,
    luggage: i32,
    pickup: Option<Stop>,
    dropoff: Option<Stop>,
    now: DateTime<Utc>,
) -> StoreResult<Booking> {
    let mut tx = pool.begin().await?;

    let ride = ride_repo::lock_ride(&mut tx, ride_id)
        .await?
        .ok_or(StoreError::NotFound("ride"))?;
    if ride.driver_id == passenger_id {
        return Err(StoreError::State("drivers cannot book their own ride".into()));
    }
    if !ride.is_bookable(now) {
        return Err(StoreError::State("ride is not open for booking".into()));
    }

    let total = ride.price_per_seat * seats as i64;
    let split = ctx.fees.split(total);

    if !ride_repo::try_reserve(&mut *tx, ride_id, seats, luggage).await? {
        return Err(StoreError::InsufficientCapacity);
    }

    let booking = booking_repo::insert_booking(
        &mut tx,
        booking_repo::NewBooking {
            ride_id,
            passenger_id,
            seats,
            luggage,
            status: BookingStatus::Accepted,
            pickup,
            dropoff,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Wallet,
            amount: total,
            psp_intent_id: None,
        },
    )
    .await?;

    let passenger_wallet = ledger_repo::get_or_create_wallet(&mut tx, passenger_id).await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: passenger_wallet.id,
            user_id: passenger_id,
            kind: TransactionKind::RidePayment,
            amount: -total,
            gross_amount: total,
            fee_amount: 0,
            fee_percent: 0,
            net_amount: total,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Booking,
            reference_id: Some(booking.id),
            psp_intent_id: None,
            psp_transfer_id: None,
            psp_payout_id: None,
            description: format!("Payment for {} seat(s)", seats),
        },
    )
    .await?;

    let driver_wallet = ledger_repo::get_or_create_wallet(&mut tx, ride.driver_id).await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: driver_wallet.id,
            user_id: ride.driver_id,
            kind: TransactionKind::RideEarning,
            amount: split.net,
            gross_amount: split.gross,
            fee_amount: split.fee,
            fee_percent: ctx.fees.percent,
            net_amount: split.net,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Booking,
            reference_id: Some(booking.id),
            psp_intent_id: None,
            psp_transfer_id: None,
            psp_payout_id: None,
            description: format!("Earnings for {} seat(s)", seats),
        },
    )
    .await?;

    tx.commit().await?;
    Ok(booking)
}

/// Settles a confirmed card intent: re-validate, reserve, book, and credit
/// the driver internally when the charge was not split.
///
/// `InsufficientCapacity` / `Conflict` after a succeeded intent mean the
/// caller must refund and surface "seats no longer available".
pub async fn complete_card_booking(
    pool: &PgPool,
    ctx: &MoneyCtx,
    intent: &PaymentIntent,
    now: DateTime<Utc>,
) -> StoreResult<Booking> {
    let ride_id = meta_uuid(&intent.metadata, "ride_id")?;
    let passenger_id = meta_uuid(&intent.metadata, "passenger_id")?;
    let seats = meta_i32(&intent.metadata, "seats")?;
    let luggage = meta_i32(&intent.metadata, "luggage")?;

    let mut tx = pool.begin().await?;

    let ride = ride_repo::lock_ride(&mut tx, ride_id)
        .await?
        .ok_or(StoreError::NotFound("ride"))?;
    if !ride.is_bookable(now) {
        return Err(StoreError::State("ride is not open for booking".into()));
    }
    let expected = ride.price_per_seat * seats as i64;
    if intent.amount != expected {
        return Err(StoreError::State(format!(
            "intent amount {} does not match expected {expected}",
            intent.amount
        )));
    }

    if !ride_repo::try_reserve(&mut *tx, ride_id, seats, luggage).await? {
        return Err(StoreError::InsufficientCapacity);
    }

    let booking = booking_repo::insert_booking(
        &mut tx,
        booking_repo::NewBooking {
            ride_id,
            passenger_id,
            seats,
            luggage,
            status: BookingStatus::Accepted,
            pickup: None,
            dropoff: None,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Card,
            amount: intent.amount,
            psp_intent_id: Some(intent.id.clone()),
        },
    )
    .await?;

    // Split charges settle at the PSP; everything else is credited on the
    // internal ledger, once per intent whichever path gets there first.
    if intent.transfer_destination.is_none()
        && !ledger_repo::earning_exists_for_intent(&mut *tx, &intent.id).await?
    {
        let split = ctx.fees.split(intent.amount);
        let driver_wallet = ledger_repo::get_or_create_wallet(&mut tx, ride.driver_id).await?;
        ledger_repo::append(
            &mut tx,
            ledger_repo::NewLedgerEntry {
                wallet_id: driver_wallet.id,
                user_id: ride.driver_id,
                kind: TransactionKind::RideEarning,
                amount: split.net,
                gross_amount: split.gross,
                fee_amount: split.fee,
                fee_percent: ctx.fees.percent,
                net_amount: split.net,
                currency: ctx.currency.clone(),
                status: TransactionStatus::Completed,
                reference_kind: ReferenceKind::Booking,
                reference_id: Some(booking.id),
                psp_intent_id: Some(intent.id.clone()),
                psp_transfer_id: None,
                psp_payout_id: None,
                description: format!("Earnings for {} seat(s)", seats),
            },
        )
        .await?;
    }

    tx.commit().await?;
    Ok(booking)
}

/// Driver accepting a pending booking: the conditional capacity decrement
/// and the status flip share a transaction.
pub async fn driver_accept_booking(pool: &PgPool, booking_id: Uuid) -> StoreResult<Booking> {
    let mut tx = pool.begin().await?;

    let booking = booking_repo::lock_booking(&mut tx, booking_id)
        .await?
        .ok_or(StoreError::NotFound("booking"))?;
    if booking.status != BookingStatus::Pending {
        return Err(StoreError::State(format!(
            "booking is {}, not pending",
            booking.status.as_str()
        )));
    }

    if !ride_repo::try_reserve(&mut *tx, booking.ride_id, booking.seats, booking.luggage).await? {
        return Err(StoreError::InsufficientCapacity);
    }
    booking_repo::set_status_if(&mut *tx, booking_id, &[BookingStatus::Pending], BookingStatus::Accepted)
        .await?;

    tx.commit().await?;
    Ok(Booking { status: BookingStatus::Accepted, ..booking })
}

// ============================================================================
// Cancellation
// ============================================================================

/// First phase of a cancellation: flip the booking and give back capacity.
/// Commits before any refund is attempted, so refund failures can never
/// undo it. Returns `None` when another cancellation won the race.
pub async fn cancel_booking_phase1(
    pool: &PgPool,
    booking_id: Uuid,
    reason: RefundReason,
) -> StoreResult<Option<Booking>> {
    let mut tx = pool.begin().await?;

    let booking = booking_repo::lock_booking(&mut tx, booking_id)
        .await?
        .ok_or(StoreError::NotFound("booking"))?;
    if booking.status.is_terminal() {
        return Ok(None);
    }

    booking_repo::set_status_if(
        &mut *tx,
        booking_id,
        &[BookingStatus::Pending, BookingStatus::Accepted],
        BookingStatus::Cancelled,
    )
    .await?;
    booking_repo::set_refund_reason(&mut *tx, booking_id, reason).await?;

    if booking.releases_capacity_on_cancel() {
        ride_repo::release(&mut *tx, booking.ride_id, booking.seats, booking.luggage).await?;
    }

    tx.commit().await?;
    Ok(Some(booking))
}

/// Second phase: record the 100 % refund on the ledger and mark the
/// booking refunded. `refund_id` is the PSP refund for card payments.
pub async fn apply_refund_ledger(
    pool: &PgPool,
    ctx: &MoneyCtx,
    booking: &Booking,
    driver_id: Uuid,
    plan: &RefundPlan,
    refund_id: Option<&str>,
) -> StoreResult<()> {
    let mut tx = pool.begin().await?;

    if plan.credit_passenger > 0 {
        let wallet = ledger_repo::get_or_create_wallet(&mut tx, booking.passenger_id).await?;
        ledger_repo::append(
            &mut tx,
            ledger_repo::NewLedgerEntry {
                wallet_id: wallet.id,
                user_id: booking.passenger_id,
                kind: TransactionKind::Refund,
                amount: plan.credit_passenger,
                gross_amount: plan.credit_passenger,
                fee_amount: 0,
                fee_percent: 0,
                net_amount: plan.credit_passenger,
                currency: ctx.currency.clone(),
                status: TransactionStatus::Completed,
                reference_kind: ReferenceKind::Booking,
                reference_id: Some(booking.id),
                psp_intent_id: booking.psp_intent_id.clone(),
                psp_transfer_id: None,
                psp_payout_id: None,
                description: "Booking refund".into(),
            },
        )
        .await?;
    }

    if let Some(debit) = plan.debit_driver {
        let wallet = ledger_repo::get_or_create_wallet(&mut tx, driver_id).await?;
        ledger_repo::append(
            &mut tx,
            ledger_repo::NewLedgerEntry {
                wallet_id: wallet.id,
                user_id: driver_id,
                kind: TransactionKind::Refund,
                amount: -debit,
                gross_amount: booking.amount,
                fee_amount: 0,
                fee_percent: 0,
                net_amount: debit,
                currency: ctx.currency.clone(),
                status: TransactionStatus::Completed,
                reference_kind: ReferenceKind::Booking,
                reference_id: Some(booking.id),
                psp_intent_id: booking.psp_intent_id.clone(),
                psp_transfer_id: None,
                psp_payout_id: None,
                description: "Earnings reversed on cancellation".into(),
            },
        )
        .await?;
    }

    booking_repo::mark_refunded(&mut *tx, booking.id, refund_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Driver cancelling a whole ride: freeze it, cancel every open booking
/// and restore their seats, one transaction. Refunds follow per booking.
pub async fn cancel_ride_phase1(
    pool: &PgPool,
    ride_id: Uuid,
    driver_id: Uuid,
) -> StoreResult<Vec<Booking>> {
    let mut tx = pool.begin().await?;

    let ride = ride_repo::lock_ride(&mut tx, ride_id)
        .await?
        .ok_or(StoreError::NotFound("ride"))?;
    if ride.driver_id != driver_id {
        return Err(StoreError::State("only the driver may cancel this ride".into()));
    }
    if !ride_repo::freeze(&mut *tx, ride_id).await? {
        return Err(StoreError::State("ride is not active".into()));
    }

    let open = booking_repo::lock_open_bookings_for_ride(&mut tx, ride_id).await?;
    for booking in &open {
        booking_repo::set_status_if(
            &mut *tx,
            booking.id,
            &[BookingStatus::Pending, BookingStatus::Accepted],
            BookingStatus::Cancelled,
        )
        .await?;
        booking_repo::set_refund_reason(&mut *tx, booking.id, RefundReason::RideCancelled).await?;
        if booking.releases_capacity_on_cancel() {
            ride_repo::release(&mut *tx, ride_id, booking.seats, booking.luggage).await?;
        }
    }

    tx.commit().await?;
    Ok(open)
}

// ============================================================================
// Offer acceptance
// ============================================================================

pub struct AcceptedOffer {
    pub request: RideRequest,
    pub offer: Offer,
    pub rejected: Vec<Offer>,
    pub total: i64,
}

/// Paid acceptance via wallet: debit, credit, and the all-or-nothing flip
/// of the chosen offer to accepted and every sibling to rejected.
pub async fn accept_offer_with_wallet(
    pool: &PgPool,
    ctx: &MoneyCtx,
    request_id: Uuid,
    offer_id: Uuid,
    passenger_id: Uuid,
    now: DateTime<Utc>,
) -> StoreResult<AcceptedOffer> {
    let mut tx = pool.begin().await?;

    let request = request_repo::lock_request(&mut tx, request_id)
        .await?
        .ok_or(StoreError::NotFound("request"))?;
    let offer = request_repo::lock_offer(&mut tx, offer_id)
        .await?
        .ok_or(StoreError::NotFound("offer"))?;

    let plan = rules::plan_acceptance(&request, &offer, passenger_id, now)
        .map_err(|e| StoreError::State(e.to_string()))?;
    let split = ctx.fees.split(plan.total);

    let passenger_wallet = ledger_repo::get_or_create_wallet(&mut tx, passenger_id).await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: passenger_wallet.id,
            user_id: passenger_id,
            kind: TransactionKind::RidePayment,
            amount: -plan.total,
            gross_amount: plan.total,
            fee_amount: 0,
            fee_percent: 0,
            net_amount: plan.total,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Request,
            reference_id: Some(request.id),
            psp_intent_id: None,
            psp_transfer_id: None,
            psp_payout_id: None,
            description: format!("Payment for accepted offer, {} seat(s)", request.seats_needed),
        },
    )
    .await?;

    let driver_wallet = ledger_repo::get_or_create_wallet(&mut tx, offer.driver_id).await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: driver_wallet.id,
            user_id: offer.driver_id,
            kind: TransactionKind::RideEarning,
            amount: split.net,
            gross_amount: split.gross,
            fee_amount: split.fee,
            fee_percent: ctx.fees.percent,
            net_amount: split.net,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Request,
            reference_id: Some(request.id),
            psp_intent_id: None,
            psp_transfer_id: None,
            psp_payout_id: None,
            description: "Earnings for accepted offer".into(),
        },
    )
    .await?;

    let rejected = finish_acceptance(&mut tx, &request, &offer, PaymentMethod::Wallet, plan.total, None).await?;

    tx.commit().await?;
    Ok(AcceptedOffer { request, offer, rejected, total: plan.total })
}

/// Paid acceptance via a settled card intent. The caller has already
/// confirmed the intent; this records the flip and, when the charge was
/// not split, the driver's internal credit.
pub async fn accept_offer_with_card(
    pool: &PgPool,
    ctx: &MoneyCtx,
    request_id: Uuid,
    offer_id: Uuid,
    passenger_id: Uuid,
    intent: &PaymentIntent,
    now: DateTime<Utc>,
) -> StoreResult<AcceptedOffer> {
    let mut tx = pool.begin().await?;

    let request = request_repo::lock_request(&mut tx, request_id)
        .await?
        .ok_or(StoreError::NotFound("request"))?;
    let offer = request_repo::lock_offer(&mut tx, offer_id)
        .await?
        .ok_or(StoreError::NotFound("offer"))?;

    let plan = rules::plan_acceptance(&request, &offer, passenger_id, now)
        .map_err(|e| StoreError::State(e.to_string()))?;
    if intent.amount != plan.total {
        return Err(StoreError::State(format!(
            "intent amount {} does not match offer total {}",
            intent.amount, plan.total
        )));
    }

    if intent.transfer_destination.is_none()
        && !ledger_repo::earning_exists_for_intent(&mut *tx, &intent.id).await?
    {
        let split = ctx.fees.split(plan.total);
        let driver_wallet = ledger_repo::get_or_create_wallet(&mut tx, offer.driver_id).await?;
        ledger_repo::append(
            &mut tx,
            ledger_repo::NewLedgerEntry {
                wallet_id: driver_wallet.id,
                user_id: offer.driver_id,
                kind: TransactionKind::RideEarning,
                amount: split.net,
                gross_amount: split.gross,
                fee_amount: split.fee,
                fee_percent: ctx.fees.percent,
                net_amount: split.net,
                currency: ctx.currency.clone(),
                status: TransactionStatus::Completed,
                reference_kind: ReferenceKind::Request,
                reference_id: Some(request.id),
                psp_intent_id: Some(intent.id.clone()),
                psp_transfer_id: None,
                psp_payout_id: None,
                description: "Earnings for accepted offer".into(),
            },
        )
        .await?;
    }

    let rejected = finish_acceptance(
        &mut tx,
        &request,
        &offer,
        PaymentMethod::Card,
        plan.total,
        Some(intent.id.as_str()),
    )
    .await?;

    tx.commit().await?;
    Ok(AcceptedOffer { request, offer, rejected, total: plan.total })
}

async fn finish_acceptance(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    request: &RideRequest,
    offer: &Offer,
    method: PaymentMethod,
    total: i64,
    psp_intent_id: Option<&str>,
) -> StoreResult<Vec<Offer>> {
    if !request_repo::accept_offer_row(tx, offer.id).await? {
        return Err(StoreError::Conflict("offer is no longer pending".into()));
    }
    let rejected = request_repo::reject_sibling_offers(tx, request.id, offer.id).await?;
    if !request_repo::mark_request_accepted(
        tx,
        request.id,
        offer.driver_id,
        offer.ride_id,
        method,
        total,
        psp_intent_id,
    )
    .await?
    {
        return Err(StoreError::Conflict("request is no longer pending".into()));
    }
    Ok(rejected)
}

// ============================================================================
// Withdrawals
// ============================================================================

/// Debits the wallet and opens a payout in one transaction. The PSP
/// transfer happens after commit; a transfer failure is compensated with
/// `compensate_failed_withdrawal`.
pub async fn begin_withdrawal(
    pool: &PgPool,
    ctx: &MoneyCtx,
    user_id: Uuid,
    amount: i64,
    method: PayoutMethod,
    estimated_arrival: Option<DateTime<Utc>>,
) -> StoreResult<Payout> {
    if amount <= 0 {
        return Err(StoreError::State("withdrawal amount must be positive".into()));
    }
    let mut tx = pool.begin().await?;

    let wallet = ledger_repo::get_or_create_wallet(&mut tx, user_id).await?;
    let entry = ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: wallet.id,
            user_id,
            kind: TransactionKind::Withdrawal,
            amount: -amount,
            gross_amount: amount,
            fee_amount: 0,
            fee_percent: 0,
            net_amount: amount,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Payout,
            reference_id: None,
            psp_intent_id: None,
            psp_transfer_id: None,
            psp_payout_id: None,
            description: "Withdrawal to bank".into(),
        },
    )
    .await?;
    ledger_repo::adjust_pending(&mut tx, wallet.id, amount).await?;

    let payout =
        payout_repo::insert_payout(&mut tx, user_id, wallet.id, amount, method, entry.id, estimated_arrival)
            .await?;

    tx.commit().await?;
    Ok(payout)
}

pub async fn finalize_withdrawal_transfer(
    pool: &PgPool,
    payout_id: Uuid,
    transfer_id: &str,
) -> StoreResult<()> {
    payout_repo::attach_transfer(pool, payout_id, transfer_id).await?;
    Ok(())
}

/// The transfer never left: give the money back and fail the payout.
pub async fn compensate_failed_withdrawal(
    pool: &PgPool,
    ctx: &MoneyCtx,
    payout: &Payout,
    reason: &str,
) -> StoreResult<()> {
    let mut tx = pool.begin().await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: payout.wallet_id,
            user_id: payout.user_id,
            kind: TransactionKind::WithdrawalFailed,
            amount: payout.amount,
            gross_amount: payout.amount,
            fee_amount: 0,
            fee_percent: 0,
            net_amount: payout.amount,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Payout,
            reference_id: Some(payout.id),
            psp_intent_id: None,
            psp_transfer_id: None,
            psp_payout_id: None,
            description: "Withdrawal returned".into(),
        },
    )
    .await?;
    ledger_repo::adjust_pending(&mut tx, payout.wallet_id, -payout.amount).await?;
    payout_repo::set_status(&mut *tx, payout.id, aeropool_domain::wallet::PayoutStatus::Failed, Some(reason))
        .await?;
    tx.commit().await?;
    Ok(())
}

// ============================================================================
// Webhook reconciliation
// ============================================================================

/// What a webhook delivery did, for the response log.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    Duplicate,
    Skipped(&'static str),
}

/// `payment_intent.succeeded`: credit the driver once, unless the charge
/// was split to a connected account.
pub async fn webhook_intent_succeeded(
    pool: &PgPool,
    ctx: &MoneyCtx,
    event_id: &str,
    intent: &IntentObject,
) -> StoreResult<WebhookOutcome> {
    let mut tx = pool.begin().await?;
    if !webhook_repo::claim_event(&mut tx, event_id, "payment_intent.succeeded").await? {
        return Ok(WebhookOutcome::Duplicate);
    }

    let ride_id = match meta_uuid(&intent.metadata, "ride_id") {
        Ok(id) => id,
        Err(_) => {
            tx.commit().await?;
            return Ok(WebhookOutcome::Skipped("no ride metadata"));
        }
    };
    let driver_id: Option<Uuid> = sqlx::query_scalar("SELECT driver_id FROM rides WHERE id = $1")
        .bind(ride_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(driver_id) = driver_id else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("unknown ride"));
    };

    if intent.transfer_data.is_some()
        || driver_connected_account(&mut tx, driver_id).await?.is_some()
    {
        // Funds were routed by the split; nothing to credit internally.
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("split settlement"));
    }
    if ledger_repo::earning_exists_for_intent(&mut *tx, &intent.id).await? {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("already credited"));
    }

    let split = ctx.fees.split(intent.amount);
    let wallet = ledger_repo::get_or_create_wallet(&mut tx, driver_id).await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: wallet.id,
            user_id: driver_id,
            kind: TransactionKind::RideEarning,
            amount: split.net,
            gross_amount: split.gross,
            fee_amount: split.fee,
            fee_percent: ctx.fees.percent,
            net_amount: split.net,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Booking,
            reference_id: None,
            psp_intent_id: Some(intent.id.clone()),
            psp_transfer_id: None,
            psp_payout_id: None,
            description: "Ride earnings (reconciled from webhook)".into(),
        },
    )
    .await?;

    tx.commit().await?;
    info!("webhook credited driver {driver_id} for intent {}", intent.id);
    Ok(WebhookOutcome::Applied)
}

pub async fn webhook_intent_failed(
    pool: &PgPool,
    event_id: &str,
    intent: &IntentObject,
) -> StoreResult<WebhookOutcome> {
    let mut tx = pool.begin().await?;
    if !webhook_repo::claim_event(&mut tx, event_id, "payment_intent.payment_failed").await? {
        return Ok(WebhookOutcome::Duplicate);
    }
    let updated = booking_repo::set_payment_failed_by_intent(&mut *tx, &intent.id).await?;
    tx.commit().await?;
    if updated == 0 {
        return Ok(WebhookOutcome::Skipped("no matching booking"));
    }
    Ok(WebhookOutcome::Applied)
}

pub async fn webhook_transfer_created(
    pool: &PgPool,
    event_id: &str,
    transfer: &TransferObject,
) -> StoreResult<WebhookOutcome> {
    let mut tx = pool.begin().await?;
    if !webhook_repo::claim_event(&mut tx, event_id, "transfer.created").await? {
        return Ok(WebhookOutcome::Duplicate);
    }
    let Some(payout_id) = transfer.metadata.get("payout_id").and_then(|v| Uuid::parse_str(v).ok())
    else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("no payout metadata"));
    };
    payout_repo::attach_transfer(&mut *tx, payout_id, &transfer.id).await?;
    tx.commit().await?;
    Ok(WebhookOutcome::Applied)
}

pub async fn webhook_payout_paid(
    pool: &PgPool,
    event_id: &str,
    payout_event: &PayoutObject,
) -> StoreResult<WebhookOutcome> {
    let mut tx = pool.begin().await?;
    if !webhook_repo::claim_event(&mut tx, event_id, "payout.paid").await? {
        return Ok(WebhookOutcome::Duplicate);
    }
    let Some(payout_id) =
        payout_event.metadata.get("payout_id").and_then(|v| Uuid::parse_str(v).ok())
    else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("no payout metadata"));
    };
    let Some(payout) = payout_repo::get_payout(&mut tx, payout_id).await? else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("unknown payout"));
    };
    if payout.status == aeropool_domain::wallet::PayoutStatus::Completed {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("already completed"));
    }

    payout_repo::set_status(&mut *tx, payout.id, aeropool_domain::wallet::PayoutStatus::Completed, None)
        .await?;
    payout_repo::attach_psp_payout(&mut *tx, payout.id, &payout_event.id).await?;
    ledger_repo::adjust_pending(&mut tx, payout.wallet_id, -payout.amount).await?;
    if let Some(transaction_id) = payout.transaction_id {
        ledger_repo::mark_transaction_processed(&mut *tx, transaction_id, Some(&payout_event.id))
            .await?;
    }
    tx.commit().await?;
    Ok(WebhookOutcome::Applied)
}

/// `payout.failed`: the bank rejected it after the transfer; restore the
/// balance and fail the payout.
pub async fn webhook_payout_failed(
    pool: &PgPool,
    ctx: &MoneyCtx,
    event_id: &str,
    payout_event: &PayoutObject,
) -> StoreResult<WebhookOutcome> {
    let mut tx = pool.begin().await?;
    if !webhook_repo::claim_event(&mut tx, event_id, "payout.failed").await? {
        return Ok(WebhookOutcome::Duplicate);
    }
    let Some(payout_id) =
        payout_event.metadata.get("payout_id").and_then(|v| Uuid::parse_str(v).ok())
    else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("no payout metadata"));
    };
    let Some(payout) = payout_repo::get_payout(&mut tx, payout_id).await? else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("unknown payout"));
    };
    if payout.status == aeropool_domain::wallet::PayoutStatus::Failed {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("already failed"));
    }

    payout_repo::set_status(
        &mut *tx,
        payout.id,
        aeropool_domain::wallet::PayoutStatus::Failed,
        payout_event.failure_message.as_deref(),
    )
    .await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: payout.wallet_id,
            user_id: payout.user_id,
            kind: TransactionKind::WithdrawalFailed,
            amount: payout.amount,
            gross_amount: payout.amount,
            fee_amount: 0,
            fee_percent: 0,
            net_amount: payout.amount,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Payout,
            reference_id: Some(payout.id),
            psp_intent_id: None,
            psp_transfer_id: None,
            psp_payout_id: Some(payout_event.id.clone()),
            description: "Payout failed, funds returned".into(),
        },
    )
    .await?;
    ledger_repo::adjust_pending(&mut tx, payout.wallet_id, -payout.amount).await?;
    if let Some(transaction_id) = payout.transaction_id {
        sqlx::query("UPDATE transactions SET status = 'failed' WHERE id = $1 AND status <> 'failed'")
            .bind(transaction_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(WebhookOutcome::Applied)
}

pub async fn webhook_account_updated(
    pool: &PgPool,
    event_id: &str,
    account: &AccountObject,
) -> StoreResult<WebhookOutcome> {
    let mut tx = pool.begin().await?;
    if !webhook_repo::claim_event(&mut tx, event_id, "account.updated").await? {
        return Ok(WebhookOutcome::Duplicate);
    }
    let ready =
        account.charges_enabled && account.payouts_enabled && account.requirements.currently_due.is_empty();
    let updated = user_repo::set_connected_account_ready(&mut *tx, &account.id, ready).await?;
    tx.commit().await?;
    if updated == 0 {
        return Ok(WebhookOutcome::Skipped("unknown account"));
    }
    Ok(WebhookOutcome::Applied)
}

/// `charge.refunded`: a refund initiated at the PSP (dashboard, dispute).
/// Claws back the driver's internal share when one was credited.
pub async fn webhook_charge_refunded(
    pool: &PgPool,
    ctx: &MoneyCtx,
    event_id: &str,
    charge: &ChargeObject,
) -> StoreResult<WebhookOutcome> {
    let mut tx = pool.begin().await?;
    if !webhook_repo::claim_event(&mut tx, event_id, "charge.refunded").await? {
        return Ok(WebhookOutcome::Duplicate);
    }
    let Some(intent_id) = charge.payment_intent.as_deref() else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("charge has no intent"));
    };
    if !ledger_repo::earning_exists_for_intent(&mut *tx, intent_id).await? {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("no internal credit to reverse"));
    }
    if ledger_repo::refund_debit_exists_for_intent(&mut *tx, intent_id).await? {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("already reversed"));
    }

    let driver_id: Option<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM transactions WHERE psp_intent_id = $1 AND kind = 'ride_earning'",
    )
    .bind(intent_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(driver_id) = driver_id else {
        tx.commit().await?;
        return Ok(WebhookOutcome::Skipped("no internal credit to reverse"));
    };

    let split = ctx.fees.split(charge.amount_refunded);
    let wallet = ledger_repo::get_or_create_wallet(&mut tx, driver_id).await?;
    ledger_repo::append(
        &mut tx,
        ledger_repo::NewLedgerEntry {
            wallet_id: wallet.id,
            user_id: driver_id,
            kind: TransactionKind::Refund,
            amount: -split.net,
            gross_amount: charge.amount_refunded,
            fee_amount: split.fee,
            fee_percent: ctx.fees.percent,
            net_amount: split.net,
            currency: ctx.currency.clone(),
            status: TransactionStatus::Completed,
            reference_kind: ReferenceKind::Refund,
            reference_id: None,
            psp_intent_id: Some(intent_id.to_string()),
            psp_transfer_id: None,
            psp_payout_id: None,
            description: "Earnings reversed for provider-side refund".into(),
        },
    )
    .await?;

    tx.commit().await?;
    Ok(WebhookOutcome::Applied)
}
