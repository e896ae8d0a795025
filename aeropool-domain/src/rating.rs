use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minutes after departure before a ride's bookings become rateable.
pub const RATEABLE_DELAY_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RatingType {
    DriverToPassenger,
    PassengerToDriver,
}

impl RatingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingType::DriverToPassenger => "driver_to_passenger",
            RatingType::PassengerToDriver => "passenger_to_driver",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "driver_to_passenger" => Some(RatingType::DriverToPassenger),
            "passenger_to_driver" => Some(RatingType::PassengerToDriver),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub rating_type: RatingType,
    pub stars: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Instant the rateable window opens for a ride.
pub fn rateable_from(departure_at: DateTime<Utc>) -> DateTime<Utc> {
    departure_at + Duration::minutes(RATEABLE_DELAY_MINUTES)
}

pub fn is_rateable(departure_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= rateable_from(departure_at)
}

pub fn valid_stars(stars: i32) -> bool {
    (1..=5).contains(&stars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_opens_thirty_minutes_after_departure() {
        let dep = Utc::now();
        assert!(!is_rateable(dep, dep + Duration::minutes(29)));
        assert!(is_rateable(dep, dep + Duration::minutes(30)));
        assert!(is_rateable(dep, dep + Duration::minutes(31)));
    }

    #[test]
    fn star_bounds() {
        assert!(!valid_stars(0));
        assert!(valid_stars(1));
        assert!(valid_stars(5));
        assert!(!valid_stars(6));
    }
}
