use aeropool_core::geo::GeoPoint;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::RequestDirection;
use crate::ride::RideDirection;

pub const DEFAULT_SEARCH_RADIUS_M: f64 = 8_000.0;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Clamps page to 1.. and limit to 1..=100.
    pub fn clamped(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: Page, total: i64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: (total + page.limit - 1) / page.limit.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RideSearchParams {
    pub airport_id: Uuid,
    pub direction: Option<RideDirection>,
    /// Filters to this UTC calendar day; absent means all future rides.
    pub date: Option<NaiveDate>,
    pub min_seats: Option<i32>,
    pub pickup: Option<GeoPoint>,
    pub radius_m: f64,
    pub page: Page,
}

/// Ride row shaped for list endpoints. The route polyline is deliberately
/// not part of the projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideSearchItem {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_rating_mean: f64,
    pub driver_rating_count: i64,
    pub airport_id: Uuid,
    pub direction: RideDirection,
    pub home_city: String,
    pub home_postcode: String,
    pub departure_at: DateTime<Utc>,
    pub seats_left: i32,
    pub luggage_left: i32,
    pub price_per_seat: i64,
    /// Geodesic distance from the pickup point to the ride's route,
    /// meters; present only for pickup-point searches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RequestSearchParams {
    pub airport_id: Option<Uuid>,
    pub direction: Option<RequestDirection>,
    pub date: Option<NaiveDate>,
    pub city: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub radius_m: f64,
    pub page: Page,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSearchItem {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub passenger_name: String,
    pub airport_id: Uuid,
    pub direction: RequestDirection,
    pub city: String,
    pub address: String,
    pub preferred_at: DateTime<Utc>,
    pub flexibility_minutes: i32,
    pub seats_needed: i32,
    pub luggage: i32,
    pub max_price_per_seat: Option<i64>,
    pub expires_at: DateTime<Utc>,
    /// Whether the querying driver already has an offer on this request.
    pub has_user_offered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamping() {
        let p = Page::clamped(None, None);
        assert_eq!((p.page, p.limit), (1, 20));
        let p = Page::clamped(Some(0), Some(500));
        assert_eq!((p.page, p.limit), (1, 100));
        let p = Page::clamped(Some(3), Some(25));
        assert_eq!(p.offset(), 50);
    }

    #[test]
    fn pagination_totals() {
        let p = Pagination::new(Page { page: 1, limit: 20 }, 41);
        assert_eq!(p.total_pages, 3);
        let p = Pagination::new(Page { page: 1, limit: 20 }, 40);
        assert_eq!(p.total_pages, 2);
        let p = Pagination::new(Page { page: 1, limit: 20 }, 0);
        assert_eq!(p.total_pages, 0);
    }
}
