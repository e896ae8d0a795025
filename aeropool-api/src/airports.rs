use aeropool_core::geo::GeoPoint;
use aeropool_domain::airport::Airport;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/airports", get(search_airports))
        .route("/airports/:id", get(get_airport))
}

#[derive(Debug, Deserialize)]
struct AirportQuery {
    q: Option<String>,
    country: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    /// Meters; only meaningful together with latitude/longitude.
    radius: Option<f64>,
    limit: Option<i64>,
}

async fn search_airports(
    State(state): State<AppState>,
    Query(query): Query<AirportQuery>,
) -> Result<Json<ApiResponse<Vec<Airport>>>, AppError> {
    let near = match (query.latitude, query.longitude) {
        (Some(lat), Some(lon)) => {
            let point = GeoPoint::new(lon, lat);
            if !point.is_valid() {
                return Err(AppError::Validation("latitude/longitude out of range".into()));
            }
            Some((point, query.radius.unwrap_or(100_000.0).max(1.0)))
        }
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "latitude and longitude must be provided together".into(),
            ))
        }
    };

    let airports = state
        .airports
        .search(
            query.q.as_deref(),
            query.country.as_deref(),
            near,
            query.limit.unwrap_or(20),
        )
        .await?;
    Ok(ok(airports))
}

async fn get_airport(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Airport>>, AppError> {
    let airport = state.airports.get(id).await?.ok_or(AppError::NotFound("airport"))?;
    Ok(ok(airport))
}
