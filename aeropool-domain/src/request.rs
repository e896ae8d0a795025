use aeropool_core::geo::GeoPoint;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::{PaymentMethod, PaymentStatus};

/// How long a request stays biddable past its preferred pickup time.
pub const REQUEST_EXPIRY_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestDirection {
    ToAirport,
    FromAirport,
}

impl RequestDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestDirection::ToAirport => "to_airport",
            RequestDirection::FromAirport => "from_airport",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "to_airport" => Some(RequestDirection::ToAirport),
            "from_airport" => Some(RequestDirection::FromAirport),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "cancelled" => Some(RequestStatus::Cancelled),
            "expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OfferStatus::Pending),
            "accepted" => Some(OfferStatus::Accepted),
            "rejected" => Some(OfferStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLocation {
    pub address: String,
    pub city: String,
    pub postcode: Option<String>,
    pub point: GeoPoint,
}

/// A driver's bid on a passenger request. At most one pending offer per
/// (request, driver); the store enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub driver_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub price_per_seat: i64,
    pub message: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

/// A passenger broadcast that drivers bid on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub airport_id: Uuid,
    pub direction: RequestDirection,
    pub location: RequestLocation,
    pub preferred_at: DateTime<Utc>,
    pub flexibility_minutes: i32,
    pub seats_needed: i32,
    pub luggage: i32,
    pub max_price_per_seat: Option<i64>,
    pub notes: Option<String>,
    pub status: RequestStatus,
    pub matched_driver_id: Option<Uuid>,
    pub matched_ride_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    /// Gross amount paid on acceptance, minor units.
    pub paid_amount: i64,
    pub psp_intent_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RideRequest {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending && now < self.expires_at
    }
}

pub fn expiry_for(preferred_at: DateTime<Utc>) -> DateTime<Utc> {
    preferred_at + Duration::minutes(REQUEST_EXPIRY_MINUTES)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("preferred time must be in the future")]
    PreferredInPast,
    #[error("seats_needed must be between 1 and 8")]
    BadSeatCount,
    #[error("luggage must not be negative")]
    NegativeLuggage,
    #[error("pickup coordinates are out of range")]
    BadCoordinates,
    #[error("max_price_per_seat must not be negative")]
    NegativePrice,
}

pub fn validate_new_request(
    preferred_at: DateTime<Utc>,
    now: DateTime<Utc>,
    seats_needed: i32,
    luggage: i32,
    max_price_per_seat: Option<i64>,
    point: GeoPoint,
) -> Result<(), RequestValidationError> {
    if preferred_at <= now {
        return Err(RequestValidationError::PreferredInPast);
    }
    if !(1..=8).contains(&seats_needed) {
        return Err(RequestValidationError::BadSeatCount);
    }
    if luggage < 0 {
        return Err(RequestValidationError::NegativeLuggage);
    }
    if max_price_per_seat.is_some_and(|p| p < 0) {
        return Err(RequestValidationError::NegativePrice);
    }
    if !point.is_valid() {
        return Err(RequestValidationError::BadCoordinates);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_one_hour_after_preferred() {
        let preferred = Utc::now();
        assert_eq!(expiry_for(preferred), preferred + Duration::minutes(60));
    }

    #[test]
    fn request_validation() {
        let now = Utc::now();
        let later = now + Duration::hours(3);
        let p = GeoPoint::new(4.9, 52.3);
        assert!(validate_new_request(later, now, 2, 1, Some(1500), p).is_ok());
        assert_eq!(
            validate_new_request(now, now, 2, 1, None, p),
            Err(RequestValidationError::PreferredInPast)
        );
        assert_eq!(
            validate_new_request(later, now, 9, 1, None, p),
            Err(RequestValidationError::BadSeatCount)
        );
        assert_eq!(
            validate_new_request(later, now, 0, 1, None, p),
            Err(RequestValidationError::BadSeatCount)
        );
    }

    #[test]
    fn open_requests_respect_expiry() {
        let now = Utc::now();
        let mut req = sample_request(now);
        assert!(req.is_open(now));
        assert!(!req.is_open(req.expires_at + Duration::seconds(1)));
        req.status = RequestStatus::Cancelled;
        assert!(!req.is_open(now));
    }

    fn sample_request(now: DateTime<Utc>) -> RideRequest {
        RideRequest {
            id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            airport_id: Uuid::new_v4(),
            direction: RequestDirection::ToAirport,
            location: RequestLocation {
                address: "Damrak 1".into(),
                city: "Amsterdam".into(),
                postcode: None,
                point: GeoPoint::new(4.9, 52.37),
            },
            preferred_at: now + Duration::hours(2),
            flexibility_minutes: 30,
            seats_needed: 1,
            luggage: 1,
            max_price_per_seat: None,
            notes: None,
            status: RequestStatus::Pending,
            matched_driver_id: None,
            matched_ride_id: None,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            paid_amount: 0,
            psp_intent_id: None,
            expires_at: expiry_for(now + Duration::hours(2)),
            created_at: now,
            updated_at: now,
        }
    }
}
