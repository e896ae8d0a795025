use aeropool_booking::orchestrator::PaymentError;
use aeropool_booking::transition::TransitionError;
use aeropool_booking::webhook::WebhookError;
use aeropool_request::rules::OfferError;
use aeropool_store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Payment(String),
    #[error("{0}")]
    Permission(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Capacity(String),
    #[error("{0}")]
    State(String),
    #[error("Too many requests")]
    RateLimit,
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Payment(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::Permission(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Capacity(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::State(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::RateLimit => (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string()),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::InsufficientCapacity => {
                AppError::Capacity("insufficient seats or luggage".into())
            }
            StoreError::InsufficientBalance => {
                AppError::Capacity("insufficient wallet balance".into())
            }
            StoreError::State(msg) => AppError::State(msg),
            StoreError::Sqlx(e) => AppError::Anyhow(e.into()),
            StoreError::Decode(msg) => AppError::Anyhow(anyhow::anyhow!("decode: {msg}")),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::IntentNotSucceeded(id) => {
                AppError::Payment(format!("payment {id} has not succeeded"))
            }
            PaymentError::Provider(msg) => {
                tracing::error!("payment provider error: {msg}");
                AppError::Payment("payment provider error".into())
            }
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::WrongActor(_) => AppError::Permission(err.to_string()),
            _ => AppError::State(err.to_string()),
        }
    }
}

impl From<OfferError> for AppError {
    fn from(err: OfferError) -> Self {
        match err {
            OfferError::NotRequestOwner | OfferError::NotOfferOwner => {
                AppError::Permission(err.to_string())
            }
            _ => AppError::State(err.to_string()),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::SignatureInvalid => AppError::Auth(err.to_string()),
            WebhookError::Malformed(_) => AppError::Validation(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Anyhow(err.into())
    }
}
