use aeropool_domain::wallet::{
    ReferenceKind, Transaction, TransactionKind, TransactionStatus, Wallet,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{StoreError, StoreResult};

pub struct LedgerRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: Uuid,
    balance: i64,
    pending_balance: i64,
    total_earned: i64,
    total_withdrawn: i64,
    currency: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const WALLET_COLUMNS: &str = "id, user_id, balance, pending_balance, total_earned, total_withdrawn, currency, \
     is_active, created_at, updated_at";

fn map_wallet(row: WalletRow) -> Wallet {
    Wallet {
        id: row.id,
        user_id: row.user_id,
        balance: row.balance,
        pending_balance: row.pending_balance,
        total_earned: row.total_earned,
        total_withdrawn: row.total_withdrawn,
        currency: row.currency,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    wallet_id: Uuid,
    user_id: Uuid,
    kind: String,
    amount: i64,
    gross_amount: i64,
    fee_amount: i64,
    fee_percent: i64,
    net_amount: i64,
    currency: String,
    status: String,
    reference_kind: String,
    reference_id: Option<Uuid>,
    psp_intent_id: Option<String>,
    psp_transfer_id: Option<String>,
    psp_payout_id: Option<String>,
    description: String,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

const TX_COLUMNS: &str = "id, wallet_id, user_id, kind, amount, gross_amount, fee_amount, fee_percent, \
     net_amount, currency, status, reference_kind, reference_id, psp_intent_id, \
     psp_transfer_id, psp_payout_id, description, processed_at, created_at";

fn map_transaction(row: TransactionRow) -> StoreResult<Transaction> {
    let kind = TransactionKind::parse(&row.kind)
        .ok_or_else(|| StoreError::Decode(format!("unknown transaction kind {}", row.kind)))?;
    let status = TransactionStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Decode(format!("unknown transaction status {}", row.status)))?;
    let reference_kind = ReferenceKind::parse(&row.reference_kind)
        .ok_or_else(|| StoreError::Decode(format!("unknown reference kind {}", row.reference_kind)))?;
    Ok(Transaction {
        id: row.id,
        wallet_id: row.wallet_id,
        user_id: row.user_id,
        kind,
        amount: row.amount,
        gross_amount: row.gross_amount,
        fee_amount: row.fee_amount,
        fee_percent: row.fee_percent,
        net_amount: row.net_amount,
        currency: row.currency,
        status,
        reference_kind,
        reference_id: row.reference_id,
        psp_intent_id: row.psp_intent_id,
        psp_transfer_id: row.psp_transfer_id,
        psp_payout_id: row.psp_payout_id,
        description: row.description,
        processed_at: row.processed_at,
        created_at: row.created_at,
    })
}

/// On-demand wallet materialization: every user has a wallet the first
/// time anything asks for it.
pub async fn get_or_create_wallet(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> StoreResult<Wallet> {
    sqlx::query("INSERT INTO wallets (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1");
    let row: WalletRow = sqlx::query_as(&sql).bind(user_id).fetch_one(conn).await?;
    Ok(map_wallet(row))
}

/// Serializes all balance mutation per wallet.
async fn lock_wallet(conn: &mut sqlx::PgConnection, wallet_id: Uuid) -> StoreResult<Wallet> {
    let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1 FOR UPDATE");
    let row: Option<WalletRow> = sqlx::query_as(&sql).bind(wallet_id).fetch_optional(conn).await?;
    row.map(map_wallet).ok_or(StoreError::NotFound("wallet"))
}

pub struct NewLedgerEntry {
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    /// Signed minor units: credits positive, debits negative.
    pub amount: i64,
    pub gross_amount: i64,
    pub fee_amount: i64,
    pub fee_percent: i64,
    pub net_amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub reference_kind: ReferenceKind,
    pub reference_id: Option<Uuid>,
    pub psp_intent_id: Option<String>,
    pub psp_transfer_id: Option<String>,
    pub psp_payout_id: Option<String>,
    pub description: String,
}

/// Appends a ledger row and applies it to the wallet totals in the same
/// transaction, with the wallet row locked. A reader never observes one
/// side without the other.
pub async fn append(conn: &mut sqlx::PgConnection, entry: NewLedgerEntry) -> StoreResult<Transaction> {
    let wallet = lock_wallet(conn, entry.wallet_id).await?;

    let applies = entry.status == TransactionStatus::Completed && entry.kind.affects_balance();
    if applies {
        let new_balance = wallet.balance + entry.amount;
        if new_balance < 0 {
            return Err(StoreError::InsufficientBalance);
        }
        let earned_delta = if entry.kind.is_earning() && entry.amount > 0 { entry.amount } else { 0 };
        let withdrawn_delta = if entry.kind == TransactionKind::Withdrawal && entry.amount < 0 {
            -entry.amount
        } else {
            0
        };
        sqlx::query(
            "UPDATE wallets SET balance = $2, total_earned = total_earned + $3, \
                total_withdrawn = total_withdrawn + $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(wallet.id)
        .bind(new_balance)
        .bind(earned_delta)
        .bind(withdrawn_delta)
        .execute(&mut *conn)
        .await?;
    }

    let sql = format!(
        "INSERT INTO transactions (id, wallet_id, user_id, kind, amount, gross_amount, \
            fee_amount, fee_percent, net_amount, currency, status, reference_kind, \
            reference_id, psp_intent_id, psp_transfer_id, psp_payout_id, description, processed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
         RETURNING {TX_COLUMNS}"
    );
    let processed_at = if applies { Some(Utc::now()) } else { None };
    let row: TransactionRow = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(entry.wallet_id)
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.gross_amount)
        .bind(entry.fee_amount)
        .bind(entry.fee_percent)
        .bind(entry.net_amount)
        .bind(&entry.currency)
        .bind(entry.status.as_str())
        .bind(entry.reference_kind.as_str())
        .bind(entry.reference_id)
        .bind(&entry.psp_intent_id)
        .bind(&entry.psp_transfer_id)
        .bind(&entry.psp_payout_id)
        .bind(&entry.description)
        .bind(processed_at)
        .fetch_one(conn)
        .await?;
    map_transaction(row)
}

/// Moves funds between spendable and in-flight, e.g. while a payout is at
/// the PSP. Caller holds the surrounding transaction.
pub async fn adjust_pending(
    conn: &mut sqlx::PgConnection,
    wallet_id: Uuid,
    delta: i64,
) -> StoreResult<()> {
    let result = sqlx::query(
        "UPDATE wallets SET pending_balance = pending_balance + $2, updated_at = NOW() \
         WHERE id = $1 AND pending_balance + $2 >= 0",
    )
    .bind(wallet_id)
    .bind(delta)
    .execute(conn)
    .await?;
    if result.rows_affected() != 1 {
        return Err(StoreError::State("pending balance would go negative".into()));
    }
    Ok(())
}

/// Whether a payment intent has already credited a driver. Guards both the
/// completion path and the webhook against double credit.
pub async fn earning_exists_for_intent<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    intent_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM transactions \
         WHERE psp_intent_id = $1 AND kind = 'ride_earning')",
    )
    .bind(intent_id)
    .fetch_one(exec)
    .await
}

/// Whether a driver-side refund debit was already recorded for an intent.
pub async fn refund_debit_exists_for_intent<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    intent_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM transactions \
         WHERE psp_intent_id = $1 AND kind = 'refund' AND amount < 0)",
    )
    .bind(intent_id)
    .fetch_one(exec)
    .await
}

#[derive(Debug, Default, serde::Serialize)]
pub struct EarningsSummary {
    pub total_earned: i64,
    pub total_spent: i64,
    pub total_withdrawn: i64,
    pub total_refunded_in: i64,
    pub completed_count: i64,
}

impl LedgerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_wallet(&self, user_id: Uuid) -> StoreResult<Wallet> {
        let mut conn = self.pool.acquire().await?;
        get_or_create_wallet(&mut conn, user_id).await
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        kind: Option<TransactionKind>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Transaction>, i64)> {
        let kind_str = kind.map(|k| k.as_str()).unwrap_or("");
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions \
             WHERE user_id = $1 AND ($2 = '' OR kind = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(kind_str)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND ($2 = '' OR kind = $2)",
        )
        .bind(user_id)
        .bind(kind_str)
        .fetch_one(&self.pool)
        .await?;
        let txs = rows.into_iter().map(map_transaction).collect::<StoreResult<Vec<_>>>()?;
        Ok((txs, total))
    }

    /// Audit: the stored balance must equal the completed ledger sum.
    pub async fn recompute_balance(&self, wallet_id: Uuid) -> StoreResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transactions \
             WHERE wallet_id = $1 AND status = 'completed' AND kind <> 'platform_fee'",
        )
        .bind(wallet_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }

    pub async fn earnings_summary(&self, user_id: Uuid) -> StoreResult<EarningsSummary> {
        #[derive(sqlx::FromRow)]
        struct SummaryRow {
            total_earned: i64,
            total_spent: i64,
            total_withdrawn: i64,
            total_refunded_in: i64,
            completed_count: i64,
        }
        let row: SummaryRow = sqlx::query_as(
            "SELECT \
                COALESCE(SUM(CASE WHEN kind = 'ride_earning' THEN amount ELSE 0 END), 0)::BIGINT AS total_earned, \
                COALESCE(SUM(CASE WHEN kind = 'ride_payment' THEN -amount ELSE 0 END), 0)::BIGINT AS total_spent, \
                COALESCE(SUM(CASE WHEN kind = 'withdrawal' THEN -amount ELSE 0 END), 0)::BIGINT AS total_withdrawn, \
                COALESCE(SUM(CASE WHEN kind = 'refund' AND amount > 0 THEN amount ELSE 0 END), 0)::BIGINT AS total_refunded_in, \
                COUNT(*) AS completed_count \
             FROM transactions WHERE user_id = $1 AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(EarningsSummary {
            total_earned: row.total_earned,
            total_spent: row.total_spent,
            total_withdrawn: row.total_withdrawn,
            total_refunded_in: row.total_refunded_in,
            completed_count: row.completed_count,
        })
    }
}

/// Sets the settlement markers on a withdrawal row once its payout lands.
pub async fn mark_transaction_processed<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    transaction_id: Uuid,
    psp_payout_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE transactions SET processed_at = NOW(), \
            psp_payout_id = COALESCE($2, psp_payout_id) \
         WHERE id = $1",
    )
    .bind(transaction_id)
    .bind(psp_payout_id)
    .execute(exec)
    .await?;
    Ok(())
}
