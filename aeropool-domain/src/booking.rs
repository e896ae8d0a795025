use aeropool_core::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "accepted" => Some(BookingStatus::Accepted),
            "rejected" => Some(BookingStatus::Rejected),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Wallet,
    None,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(PaymentMethod::Card),
            "wallet" => Some(PaymentMethod::Wallet),
            "none" => Some(PaymentMethod::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    PassengerCancelled,
    DriverCancelled,
    RideCancelled,
    AdminAction,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::PassengerCancelled => "passenger_cancelled",
            RefundReason::DriverCancelled => "driver_cancelled",
            RefundReason::RideCancelled => "ride_cancelled",
            RefundReason::AdminAction => "admin_action",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passenger_cancelled" => Some(RefundReason::PassengerCancelled),
            "driver_cancelled" => Some(RefundReason::DriverCancelled),
            "ride_cancelled" => Some(RefundReason::RideCancelled),
            "admin_action" => Some(RefundReason::AdminAction),
            _ => None,
        }
    }
}

/// Optional pickup/dropoff override for a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub address: String,
    pub point: GeoPoint,
}

/// A passenger's claim on seats of a published ride.
///
/// At most one booking exists per (ride, passenger); the store enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub luggage: i32,
    pub status: BookingStatus,
    pub pickup: Option<Stop>,
    pub dropoff: Option<Stop>,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    /// Gross amount paid, minor units. Zero while unpaid.
    pub amount: i64,
    pub psp_intent_id: Option<String>,
    pub refund_id: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<RefundReason>,
    /// Set when a refund attempt failed and needs manual reconciliation.
    pub refund_failed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Cancelling an accepted booking must give the seats back; cancelling
    /// a pending one never touched capacity.
    pub fn releases_capacity_on_cancel(&self) -> bool {
        self.status == BookingStatus::Accepted
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in ["pending", "accepted", "rejected", "cancelled"] {
            assert_eq!(BookingStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(BookingStatus::parse("paused").is_none());
    }

    #[test]
    fn capacity_release_only_from_accepted() {
        let mut b = sample_booking();
        assert!(!b.releases_capacity_on_cancel());
        b.status = BookingStatus::Accepted;
        assert!(b.releases_capacity_on_cancel());
    }

    fn sample_booking() -> Booking {
        Booking {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            seats: 1,
            luggage: 0,
            status: BookingStatus::Pending,
            pickup: None,
            dropoff: None,
            payment_status: PaymentStatus::Unpaid,
            payment_method: PaymentMethod::None,
            amount: 0,
            psp_intent_id: None,
            refund_id: None,
            refunded_at: None,
            refund_reason: None,
            refund_failed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
