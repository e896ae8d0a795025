use axum::{
    extract::{ConnectInfo, State},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod airports;
pub mod auth;
pub mod bookings;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod payments;
pub mod ratings;
pub mod requests;
pub mod response;
pub mod rides;
pub mod scheduler;
pub mod state;
pub mod wallet;
pub mod webhooks;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let public = Router::new()
        .merge(auth::routes())
        .merge(airports::routes())
        .merge(rides::routes())
        .merge(webhooks::routes());

    let protected = Router::new()
        .merge(auth::protected_routes())
        .merge(rides::protected_routes())
        .merge(bookings::protected_routes())
        .merge(payments::protected_routes())
        .merge(requests::protected_routes())
        .merge(wallet::protected_routes())
        .merge(notifications::protected_routes())
        .merge(ratings::protected_routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", public.merge(protected))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Per-IP fixed-window limiter backed by Redis; fails open when the cache
/// backend is down or no peer address is known (tests).
async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().cloned() else {
        return Ok(next.run(req).await);
    };
    let key = format!("ratelimit:{}", addr.ip());
    match state.cache.incr_window(&key, 60).await {
        Some(count) if count > 300 => Err((
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({"success": false, "message": "Too many requests"})),
        )),
        _ => Ok(next.run(req).await),
    }
}
