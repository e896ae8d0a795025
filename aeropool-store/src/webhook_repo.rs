use crate::StoreResult;

/// Claims a webhook event id inside the effect's transaction. Returns
/// false when the event was already processed, making every handler a
/// no-op on redelivery.
pub async fn claim_event(
    conn: &mut sqlx::PgConnection,
    event_id: &str,
    event_type: &str,
) -> StoreResult<bool> {
    let result = sqlx::query(
        "INSERT INTO webhook_events (id, event_type) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
    )
    .bind(event_id)
    .bind(event_type)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
