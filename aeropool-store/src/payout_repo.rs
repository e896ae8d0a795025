use aeropool_domain::wallet::{Payout, PayoutMethod, PayoutStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{StoreError, StoreResult};

pub struct PayoutRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PayoutRow {
    id: Uuid,
    user_id: Uuid,
    wallet_id: Uuid,
    amount: i64,
    status: String,
    psp_payout_id: Option<String>,
    psp_transfer_id: Option<String>,
    method: String,
    failure_reason: Option<String>,
    estimated_arrival: Option<DateTime<Utc>>,
    transaction_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PAYOUT_COLUMNS: &str = "id, user_id, wallet_id, amount, status, psp_payout_id, psp_transfer_id, method, \
     failure_reason, estimated_arrival, transaction_id, created_at, updated_at";

fn map_payout(row: PayoutRow) -> StoreResult<Payout> {
    let status = PayoutStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Decode(format!("unknown payout status {}", row.status)))?;
    let method = PayoutMethod::parse(&row.method)
        .ok_or_else(|| StoreError::Decode(format!("unknown payout method {}", row.method)))?;
    Ok(Payout {
        id: row.id,
        user_id: row.user_id,
        wallet_id: row.wallet_id,
        amount: row.amount,
        status,
        psp_payout_id: row.psp_payout_id,
        psp_transfer_id: row.psp_transfer_id,
        method,
        failure_reason: row.failure_reason,
        estimated_arrival: row.estimated_arrival,
        transaction_id: row.transaction_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Inserted inside the withdrawal transaction, next to the ledger debit.
pub async fn insert_payout(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
    wallet_id: Uuid,
    amount: i64,
    method: PayoutMethod,
    transaction_id: Uuid,
    estimated_arrival: Option<DateTime<Utc>>,
) -> StoreResult<Payout> {
    let sql = format!(
        "INSERT INTO payouts (id, user_id, wallet_id, amount, method, transaction_id, estimated_arrival) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PAYOUT_COLUMNS}"
    );
    let row: PayoutRow = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(wallet_id)
        .bind(amount)
        .bind(method.as_str())
        .bind(transaction_id)
        .bind(estimated_arrival)
        .fetch_one(conn)
        .await?;
    map_payout(row)
}

pub async fn get_payout(
    conn: &mut sqlx::PgConnection,
    payout_id: Uuid,
) -> StoreResult<Option<Payout>> {
    let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1 FOR UPDATE");
    let row: Option<PayoutRow> = sqlx::query_as(&sql).bind(payout_id).fetch_optional(conn).await?;
    row.map(map_payout).transpose()
}

pub async fn set_status<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    payout_id: Uuid,
    status: PayoutStatus,
    failure_reason: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE payouts SET status = $2, failure_reason = COALESCE($3, failure_reason), \
            updated_at = NOW() WHERE id = $1",
    )
    .bind(payout_id)
    .bind(status.as_str())
    .bind(failure_reason)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn attach_transfer<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    payout_id: Uuid,
    transfer_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE payouts SET psp_transfer_id = $2, status = 'processing', updated_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'processing')",
    )
    .bind(payout_id)
    .bind(transfer_id)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn attach_psp_payout<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    payout_id: Uuid,
    psp_payout_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payouts SET psp_payout_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(payout_id)
        .bind(psp_payout_id)
        .execute(exec)
        .await?;
    Ok(())
}

impl PayoutRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Payout>> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<PayoutRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_payout).collect()
    }
}
