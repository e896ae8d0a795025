use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    /// Opens the pool sized from configuration.
    ///
    /// The acquire timeout stays tight: capacity decrements and wallet
    /// appends hold short row locks, and a request stuck waiting for a
    /// connection behind one of those should fail fast rather than queue.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_seconds))
            .connect(&cfg.url)
            .await?;

        Ok(Self { pool })
    }

    /// Applies the schema: users/airports, rides with their off-row route
    /// polylines, bookings, requests + offers, the wallet ledger, and the
    /// webhook idempotency journal.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}
