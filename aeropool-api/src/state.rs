use aeropool_booking::orchestrator::PaymentOrchestrator;
use aeropool_core::clock::Clock;
use aeropool_store::airport_repo::AirportRepo;
use aeropool_store::app_config::BusinessRules;
use aeropool_store::booking_repo::BookingRepo;
use aeropool_store::flows::MoneyCtx;
use aeropool_store::ledger_repo::LedgerRepo;
use aeropool_store::notification_repo::NotificationBus;
use aeropool_store::payout_repo::PayoutRepo;
use aeropool_store::rating_repo::RatingRepo;
use aeropool_store::request_repo::RequestRepo;
use aeropool_store::ride_repo::RideRepo;
use aeropool_store::user_repo::UserRepo;
use aeropool_store::CacheLayer;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub refresh_secret: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: CacheLayer,
    pub users: Arc<UserRepo>,
    pub airports: Arc<AirportRepo>,
    pub rides: Arc<RideRepo>,
    pub bookings: Arc<BookingRepo>,
    pub requests: Arc<RequestRepo>,
    pub ledger: Arc<LedgerRepo>,
    pub payouts: Arc<PayoutRepo>,
    pub ratings: Arc<RatingRepo>,
    pub notifier: NotificationBus,
    pub payments: Arc<PaymentOrchestrator>,
    pub clock: Arc<dyn Clock>,
    pub money: MoneyCtx,
    pub auth: AuthSettings,
    pub webhook_secret: String,
    pub rules: BusinessRules,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        cache: CacheLayer,
        payments: Arc<PaymentOrchestrator>,
        clock: Arc<dyn Clock>,
        money: MoneyCtx,
        auth: AuthSettings,
        webhook_secret: String,
        rules: BusinessRules,
    ) -> Self {
        Self {
            users: Arc::new(UserRepo::new(pool.clone())),
            airports: Arc::new(AirportRepo::new(pool.clone())),
            rides: Arc::new(RideRepo::new(pool.clone())),
            bookings: Arc::new(BookingRepo::new(pool.clone())),
            requests: Arc::new(RequestRepo::new(pool.clone())),
            ledger: Arc::new(LedgerRepo::new(pool.clone())),
            payouts: Arc::new(PayoutRepo::new(pool.clone())),
            ratings: Arc::new(RatingRepo::new(pool.clone())),
            notifier: NotificationBus::new(pool.clone(), cache.clone()),
            pool,
            cache,
            payments,
            clock,
            money,
            auth,
            webhook_secret,
            rules,
        }
    }
}
