use aeropool_core::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideDirection {
    HomeToAirport,
    AirportToHome,
}

impl RideDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideDirection::HomeToAirport => "home_to_airport",
            RideDirection::AirportToHome => "airport_to_home",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home_to_airport" => Some(RideDirection::HomeToAirport),
            "airport_to_home" => Some(RideDirection::AirportToHome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Active,
    Cancelled,
    Completed,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Active => "active",
            RideStatus::Cancelled => "cancelled",
            RideStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RideStatus::Active),
            "cancelled" => Some(RideStatus::Cancelled),
            "completed" => Some(RideStatus::Completed),
            _ => None,
        }
    }

    /// Cancelled and completed rides are immutable.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RideStatus::Active)
    }
}

/// The home-side endpoint of a trip; the other endpoint is the airport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeLocation {
    pub address: Option<String>,
    pub postcode: String,
    pub city: String,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub airport_id: Uuid,
    pub direction: RideDirection,
    pub home: HomeLocation,
    pub departure_at: DateTime<Utc>,
    pub seats_total: i32,
    pub seats_left: i32,
    pub luggage_total: i32,
    pub luggage_left: i32,
    pub price_per_seat: i64,
    pub status: RideStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        self.status == RideStatus::Active && self.departure_at > now
    }

    pub fn has_capacity(&self, seats: i32, luggage: i32) -> bool {
        self.seats_left >= seats && self.luggage_left >= luggage
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RideValidationError {
    #[error("departure must be in the future")]
    DepartureInPast,
    #[error("seats_total must be at least 1")]
    NoSeats,
    #[error("price_per_seat must not be negative")]
    NegativePrice,
    #[error("luggage_total must not be negative")]
    NegativeLuggage,
    #[error("home coordinates are out of range")]
    BadCoordinates,
}

/// Checks a driver's new trip before it is persisted.
pub fn validate_new_ride(
    departure_at: DateTime<Utc>,
    now: DateTime<Utc>,
    seats_total: i32,
    luggage_total: i32,
    price_per_seat: i64,
    home_point: GeoPoint,
) -> Result<(), RideValidationError> {
    if departure_at <= now {
        return Err(RideValidationError::DepartureInPast);
    }
    if seats_total < 1 {
        return Err(RideValidationError::NoSeats);
    }
    if luggage_total < 0 {
        return Err(RideValidationError::NegativeLuggage);
    }
    if price_per_seat < 0 {
        return Err(RideValidationError::NegativePrice);
    }
    if !home_point.is_valid() {
        return Err(RideValidationError::BadCoordinates);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_ride_validation() {
        let now = Utc::now();
        let p = GeoPoint::new(4.9, 52.37);
        assert!(validate_new_ride(now + Duration::hours(5), now, 3, 2, 2000, p).is_ok());
        assert_eq!(
            validate_new_ride(now - Duration::hours(1), now, 3, 2, 2000, p),
            Err(RideValidationError::DepartureInPast)
        );
        assert_eq!(
            validate_new_ride(now + Duration::hours(5), now, 0, 2, 2000, p),
            Err(RideValidationError::NoSeats)
        );
        assert_eq!(
            validate_new_ride(now + Duration::hours(5), now, 2, 2, -1, p),
            Err(RideValidationError::NegativePrice)
        );
        assert_eq!(
            validate_new_ride(now + Duration::hours(5), now, 2, 2, 0, GeoPoint::new(200.0, 0.0)),
            Err(RideValidationError::BadCoordinates)
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RideStatus::Active.is_terminal());
        assert!(RideStatus::Cancelled.is_terminal());
        assert!(RideStatus::Completed.is_terminal());
    }
}
