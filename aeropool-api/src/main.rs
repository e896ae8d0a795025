use aeropool_api::{app, scheduler, state::AuthSettings, AppState};
use aeropool_booking::orchestrator::{MockGateway, PaymentOrchestrator};
use aeropool_booking::stripe::StripeGateway;
use aeropool_core::clock::SystemClock;
use aeropool_core::payment::PaymentGateway;
use aeropool_domain::wallet::FeePolicy;
use aeropool_store::flows::MoneyCtx;
use aeropool_store::{CacheLayer, DbClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aeropool_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = aeropool_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Aeropool API on port {}", config.server.port);

    let db = DbClient::connect(&config.database)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let cache = CacheLayer::connect(config.redis.url.as_deref());
    if !cache.is_enabled() {
        tracing::warn!("Redis URL not configured; cache layer disabled");
    }

    let gateway: Arc<dyn PaymentGateway> = if config.stripe.secret_key.is_empty() {
        tracing::warn!("Stripe secret not configured; using the in-process mock gateway");
        Arc::new(MockGateway::new())
    } else {
        Arc::new(StripeGateway::new(
            config.stripe.secret_key.clone(),
            config.stripe.onboarding_return_url.clone(),
        ))
    };
    let payments = Arc::new(PaymentOrchestrator::new(gateway));

    let state = AppState::new(
        db.pool.clone(),
        cache,
        payments,
        Arc::new(SystemClock),
        MoneyCtx {
            fees: FeePolicy::new(config.business_rules.platform_fee_percent),
            currency: config.business_rules.currency.clone(),
        },
        AuthSettings {
            jwt_secret: config.auth.jwt_secret.clone(),
            refresh_secret: config.auth.refresh_secret.clone(),
            access_ttl_seconds: config.auth.access_ttl_seconds,
            refresh_ttl_seconds: config.auth.refresh_ttl_seconds,
        },
        config.stripe.webhook_secret.clone(),
        config.business_rules.clone(),
    );

    scheduler::start_rating_scheduler(state.clone());
    scheduler::start_expiry_sweep(state.clone());

    let router = app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind failed");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server error");
}
