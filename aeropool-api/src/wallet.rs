use aeropool_domain::search::{Page, Pagination};
use aeropool_domain::wallet::{Payout, PayoutMethod, Transaction, TransactionKind, Wallet};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::response::{ok, ok_paginated, ApiResponse};
use crate::rides::PageQuery;
use crate::state::AppState;

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(get_wallet))
        .route("/wallet/transactions", get(list_transactions))
        .route("/wallet/payouts", get(list_payouts))
        .route("/wallet/earnings-summary", get(earnings_summary))
        .route("/wallet/calculate-earnings", get(calculate_earnings))
        .route("/wallet/withdraw", post(withdraw))
        .route("/wallet/connect-bank", post(connect_bank))
        .route("/wallet/bank-status", get(bank_status))
        .route("/wallet/audit", get(audit_balance))
}

async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Wallet>>, AppError> {
    let wallet = state.ledger.get_wallet(user.id).await?;
    Ok(ok(wallet))
}

#[derive(Debug, Deserialize)]
struct TransactionsQuery {
    kind: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, AppError> {
    let kind = match query.kind.as_deref() {
        None => None,
        Some(k) => Some(
            TransactionKind::parse(k)
                .ok_or_else(|| AppError::Validation(format!("unknown transaction kind {k}")))?,
        ),
    };
    let page = Page::clamped(query.page, query.limit);
    let (transactions, total) = state
        .ledger
        .list_transactions(user.id, kind, page.limit, page.offset())
        .await?;
    Ok(ok_paginated(transactions, Pagination::new(page, total)))
}

async fn list_payouts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Payout>>>, AppError> {
    let page = Page::clamped(page.page, page.limit);
    let payouts = state.payouts.list_for_user(user.id, page.limit, page.offset()).await?;
    Ok(ok(payouts))
}

async fn earnings_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<aeropool_store::ledger_repo::EarningsSummary>>, AppError> {
    let summary = state.ledger.earnings_summary(user.id).await?;
    Ok(ok(summary))
}

#[derive(Debug, Deserialize)]
struct CalculateEarningsQuery {
    amount: i64,
}

#[derive(Debug, Serialize)]
struct EarningsPreview {
    gross: i64,
    fee: i64,
    net: i64,
    fee_percent: i64,
}

/// Fee preview: what a driver would keep of a given gross.
async fn calculate_earnings(
    State(state): State<AppState>,
    Query(query): Query<CalculateEarningsQuery>,
) -> Result<Json<ApiResponse<EarningsPreview>>, AppError> {
    if query.amount < 0 {
        return Err(AppError::Validation("amount must not be negative".into()));
    }
    let split = state.money.fees.split(query.amount);
    Ok(ok(EarningsPreview {
        gross: split.gross,
        fee: split.fee,
        net: split.net,
        fee_percent: state.money.fees.percent,
    }))
}

#[derive(Debug, Serialize)]
struct AuditView {
    wallet_id: uuid::Uuid,
    stored_balance: i64,
    ledger_balance: i64,
    consistent: bool,
}

/// Maintenance check: the stored balance must equal the completed ledger
/// sum at any snapshot.
async fn audit_balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<AuditView>>, AppError> {
    let wallet = state.ledger.get_wallet(user.id).await?;
    let ledger_balance = state.ledger.recompute_balance(wallet.id).await?;
    Ok(ok(AuditView {
        wallet_id: wallet.id,
        stored_balance: wallet.balance,
        ledger_balance,
        consistent: wallet.balance == ledger_balance,
    }))
}

#[derive(Debug, Deserialize)]
struct WithdrawBody {
    amount: i64,
    #[serde(default)]
    method: Option<String>,
}

/// POST /wallet/withdraw — debits the wallet, opens a payout, then sends
/// the PSP transfer. A transfer failure is compensated immediately; bank
/// failures arrive later via `payout.failed`.
async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<WithdrawBody>,
) -> Result<Json<ApiResponse<Payout>>, AppError> {
    if body.amount <= 0 {
        return Err(AppError::Validation("amount must be positive".into()));
    }
    let method = match body.method.as_deref() {
        None => PayoutMethod::Standard,
        Some(m) => PayoutMethod::parse(m)
            .ok_or_else(|| AppError::Validation(format!("unknown payout method {m}")))?,
    };

    let profile = state.users.get(user.id).await?.ok_or(AppError::NotFound("user"))?;
    let account_id = profile
        .connected_account_id
        .clone()
        .ok_or_else(|| AppError::State("connect a bank account before withdrawing".into()))?;
    if !profile.connected_account_ready {
        return Err(AppError::State("bank account onboarding is not finished".into()));
    }

    let estimated = state.clock.now()
        + match method {
            PayoutMethod::Standard => Duration::days(3),
            PayoutMethod::Instant => Duration::hours(1),
        };
    let payout = aeropool_store::flows::begin_withdrawal(
        &state.pool,
        &state.money,
        user.id,
        body.amount,
        method,
        Some(estimated),
    )
    .await?;

    let mut metadata = HashMap::new();
    metadata.insert("payout_id".to_string(), payout.id.to_string());
    match state
        .payments
        .gateway()
        .create_transfer(payout.amount, &state.money.currency, &account_id, metadata)
        .await
    {
        Ok(transfer) => {
            aeropool_store::flows::finalize_withdrawal_transfer(
                &state.pool,
                payout.id,
                &transfer.transfer_id,
            )
            .await?;
        }
        Err(e) => {
            error!("transfer for payout {} failed: {e}", payout.id);
            aeropool_store::flows::compensate_failed_withdrawal(
                &state.pool,
                &state.money,
                &payout,
                "transfer to connected account failed",
            )
            .await?;
            return Err(AppError::Payment("withdrawal failed; funds were returned".into()));
        }
    }

    Ok(ok(payout))
}

#[derive(Debug, Serialize)]
struct ConnectBankView {
    account_id: String,
    onboarding_url: String,
    expires_at: i64,
}

async fn connect_bank(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<ConnectBankView>>, AppError> {
    if !user.role.can_drive() {
        return Err(AppError::Permission("only drivers can connect a payout account".into()));
    }
    let link = state
        .payments
        .gateway()
        .create_connected_account(&user.email)
        .await
        .map_err(|e| AppError::Payment(e.to_string()))?;
    state.users.set_connected_account(user.id, &link.account_id).await?;
    Ok(ok(ConnectBankView {
        account_id: link.account_id,
        onboarding_url: link.onboarding_url,
        expires_at: link.expires_at,
    }))
}

#[derive(Debug, Serialize)]
struct BankStatusView {
    connected: bool,
    charges_enabled: bool,
    payouts_enabled: bool,
    requirements_due: Vec<String>,
}

async fn bank_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<BankStatusView>>, AppError> {
    let profile = state.users.get(user.id).await?.ok_or(AppError::NotFound("user"))?;
    let Some(account_id) = profile.connected_account_id else {
        return Ok(ok(BankStatusView {
            connected: false,
            charges_enabled: false,
            payouts_enabled: false,
            requirements_due: vec![],
        }));
    };

    let status = state
        .payments
        .gateway()
        .get_account(&account_id)
        .await
        .map_err(|e| AppError::Payment(e.to_string()))?;
    // Keep the cached readiness flag in sync with what the PSP says.
    aeropool_store::user_repo::set_connected_account_ready(&state.pool, &account_id, status.is_ready())
        .await?;

    Ok(ok(BankStatusView {
        connected: true,
        charges_enabled: status.charges_enabled,
        payouts_enabled: status.payouts_enabled,
        requirements_due: status.requirements_due,
    }))
}
