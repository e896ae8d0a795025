pub mod airport_repo;
pub mod app_config;
pub mod booking_repo;
pub mod cache;
pub mod database;
pub mod flows;
pub mod ledger_repo;
pub mod notification_repo;
pub mod payout_repo;
pub mod rating_repo;
pub mod request_repo;
pub mod ride_repo;
pub mod user_repo;
pub mod webhook_repo;

pub use cache::CacheLayer;
pub use database::DbClient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient seats or luggage")]
    InsufficientCapacity,
    #[error("insufficient wallet balance")]
    InsufficientBalance,
    #[error("illegal state: {0}")]
    State(String),
    #[error("stored row failed to decode: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Postgres unique-violation detection, used where concurrent inserts are
/// expected (duplicate bookings, duplicate pending offers).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
