use aeropool_domain::notification::{Notification, NotificationKind, NotificationPayload};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{notifications_key, CacheLayer};
use crate::{StoreError, StoreResult};

/// Persist-then-invalidate notification fan-out.
///
/// Emission is best-effort by contract: a failed insert is logged and never
/// fails the mutation that triggered it. The rate-prompt kinds dedupe on
/// (user, kind, booking) via the partial unique index.
#[derive(Clone)]
pub struct NotificationBus {
    pool: PgPool,
    cache: CacheLayer,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    payload: serde_json::Value,
    is_read: bool,
    created_at: DateTime<Utc>,
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, payload, is_read, created_at";

fn map_notification(row: NotificationRow) -> StoreResult<Notification> {
    let kind = NotificationKind::parse(&row.kind)
        .ok_or_else(|| StoreError::Decode(format!("unknown notification kind {}", row.kind)))?;
    Ok(Notification {
        id: row.id,
        user_id: row.user_id,
        kind,
        payload: row.payload,
        is_read: row.is_read,
        created_at: row.created_at,
    })
}

impl NotificationBus {
    pub fn new(pool: PgPool, cache: CacheLayer) -> Self {
        Self { pool, cache }
    }

    /// Persists the notification, then drops the user's cached list.
    pub async fn emit(&self, user_id: Uuid, payload: NotificationPayload) {
        let kind = payload.kind();
        let booking_id = payload.booking_id();
        let value = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("notification payload for {user_id} failed to serialize: {e}");
                return;
            }
        };
        let result = sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, payload, booking_id) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind.as_str())
        .bind(value)
        .bind(booking_id)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            warn!("notification insert for {user_id} failed: {e}");
            return;
        }
        self.cache.del(&notifications_key(user_id)).await;
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_notification).collect()
    }

    pub async fn unread_count(&self, user_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            self.cache.del(&notifications_key(user_id)).await;
            return Ok(true);
        }
        Ok(false)
    }
}
