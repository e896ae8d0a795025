use aeropool_core::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Driver,
    Passenger,
    Both,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Driver => "driver",
            UserRole::Passenger => "passenger",
            UserRole::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "driver" => Some(UserRole::Driver),
            "passenger" => Some(UserRole::Passenger),
            "both" => Some(UserRole::Both),
            _ => None,
        }
    }

    pub fn can_drive(&self) -> bool {
        matches!(self, UserRole::Driver | UserRole::Both)
    }

    pub fn can_ride(&self) -> bool {
        matches!(self, UserRole::Passenger | UserRole::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedLocation {
    pub label: String,
    pub address: String,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub phone_verified: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
    /// PSP connected payout account, once the driver has onboarded.
    pub connected_account_id: Option<String>,
    /// Cached from `account.updated` webhooks.
    pub connected_account_ready: bool,
    pub avatar_url: Option<String>,
    pub rating_mean: f64,
    pub rating_count: i64,
    pub saved_locations: Vec<SavedLocation>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Rolling mean update on a new star value, no rescan of old ratings.
    pub fn apply_rating(&mut self, stars: i32) {
        let total = self.rating_mean * self.rating_count as f64 + stars as f64;
        self.rating_count += 1;
        self.rating_mean = total / self.rating_count as f64;
    }
}

/// Case-folded email used for the uniqueness check.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_folds_case() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn rolling_rating_mean() {
        let mut user = sample_user();
        user.apply_rating(5);
        user.apply_rating(4);
        assert_eq!(user.rating_count, 2);
        assert!((user.rating_mean - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn role_capabilities() {
        assert!(UserRole::Both.can_drive() && UserRole::Both.can_ride());
        assert!(!UserRole::Passenger.can_drive());
        assert_eq!(UserRole::parse("driver"), Some(UserRole::Driver));
        assert_eq!(UserRole::parse("pilot"), None);
    }

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@b.c".into(),
            phone: None,
            phone_verified: false,
            password_hash: "x".into(),
            display_name: "A".into(),
            role: UserRole::Both,
            connected_account_id: None,
            connected_account_ready: false,
            avatar_url: None,
            rating_mean: 0.0,
            rating_count: 0,
            saved_locations: vec![],
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
