use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingRequest,
    BookingAccepted,
    BookingRejected,
    BookingCancelled,
    RideCancelled,
    ChatMessage,
    RateDriver,
    RatePassenger,
    OfferReceived,
    OfferRejected,
    RequestBooked,
    RatingReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingRequest => "booking_request",
            NotificationKind::BookingAccepted => "booking_accepted",
            NotificationKind::BookingRejected => "booking_rejected",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::RideCancelled => "ride_cancelled",
            NotificationKind::ChatMessage => "chat_message",
            NotificationKind::RateDriver => "rate_driver",
            NotificationKind::RatePassenger => "rate_passenger",
            NotificationKind::OfferReceived => "offer_received",
            NotificationKind::OfferRejected => "offer_rejected",
            NotificationKind::RequestBooked => "request_booked",
            NotificationKind::RatingReceived => "rating_received",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking_request" => Some(NotificationKind::BookingRequest),
            "booking_accepted" => Some(NotificationKind::BookingAccepted),
            "booking_rejected" => Some(NotificationKind::BookingRejected),
            "booking_cancelled" => Some(NotificationKind::BookingCancelled),
            "ride_cancelled" => Some(NotificationKind::RideCancelled),
            "chat_message" => Some(NotificationKind::ChatMessage),
            "rate_driver" => Some(NotificationKind::RateDriver),
            "rate_passenger" => Some(NotificationKind::RatePassenger),
            "offer_received" => Some(NotificationKind::OfferReceived),
            "offer_rejected" => Some(NotificationKind::OfferRejected),
            "request_booked" => Some(NotificationKind::RequestBooked),
            "rating_received" => Some(NotificationKind::RatingReceived),
            _ => None,
        }
    }

    /// Kinds that may exist at most once per (user, booking).
    pub fn unique_per_booking(&self) -> bool {
        matches!(self, NotificationKind::RateDriver | NotificationKind::RatePassenger)
    }
}

/// Typed per-kind payloads, serialized as tagged JSON in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    BookingRequest { ride_id: Uuid, booking_id: Uuid, passenger_name: String, seats: i32 },
    BookingAccepted { ride_id: Uuid, booking_id: Uuid },
    BookingRejected { ride_id: Uuid, booking_id: Uuid },
    BookingCancelled { ride_id: Uuid, booking_id: Uuid, by_driver: bool },
    RideCancelled { ride_id: Uuid, booking_id: Uuid, refunded: bool },
    ChatMessage { from_user_id: Uuid, preview: String },
    RateDriver { ride_id: Uuid, booking_id: Uuid, driver_id: Uuid },
    RatePassenger { ride_id: Uuid, booking_id: Uuid, passenger_id: Uuid },
    OfferReceived { request_id: Uuid, offer_id: Uuid, price_per_seat: i64 },
    OfferRejected { request_id: Uuid, offer_id: Uuid },
    RequestBooked { request_id: Uuid, driver_id: Uuid },
    RatingReceived { rating_id: Uuid, stars: i32 },
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationPayload::BookingRequest { .. } => NotificationKind::BookingRequest,
            NotificationPayload::BookingAccepted { .. } => NotificationKind::BookingAccepted,
            NotificationPayload::BookingRejected { .. } => NotificationKind::BookingRejected,
            NotificationPayload::BookingCancelled { .. } => NotificationKind::BookingCancelled,
            NotificationPayload::RideCancelled { .. } => NotificationKind::RideCancelled,
            NotificationPayload::ChatMessage { .. } => NotificationKind::ChatMessage,
            NotificationPayload::RateDriver { .. } => NotificationKind::RateDriver,
            NotificationPayload::RatePassenger { .. } => NotificationKind::RatePassenger,
            NotificationPayload::OfferReceived { .. } => NotificationKind::OfferReceived,
            NotificationPayload::OfferRejected { .. } => NotificationKind::OfferRejected,
            NotificationPayload::RequestBooked { .. } => NotificationKind::RequestBooked,
            NotificationPayload::RatingReceived { .. } => NotificationKind::RatingReceived,
        }
    }

    /// Booking the payload refers to, for the at-most-once kinds.
    pub fn booking_id(&self) -> Option<Uuid> {
        match self {
            NotificationPayload::BookingRequest { booking_id, .. }
            | NotificationPayload::BookingAccepted { booking_id, .. }
            | NotificationPayload::BookingRejected { booking_id, .. }
            | NotificationPayload::BookingCancelled { booking_id, .. }
            | NotificationPayload::RideCancelled { booking_id, .. }
            | NotificationPayload::RateDriver { booking_id, .. }
            | NotificationPayload::RatePassenger { booking_id, .. } => Some(*booking_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_agreement() {
        let p = NotificationPayload::OfferReceived {
            request_id: Uuid::new_v4(),
            offer_id: Uuid::new_v4(),
            price_per_seat: 1500,
        };
        assert_eq!(p.kind(), NotificationKind::OfferReceived);
        assert!(p.booking_id().is_none());

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["kind"], "offer_received");
    }

    #[test]
    fn rate_kinds_are_unique_per_booking() {
        assert!(NotificationKind::RateDriver.unique_per_booking());
        assert!(NotificationKind::RatePassenger.unique_per_booking());
        assert!(!NotificationKind::BookingRequest.unique_per_booking());
    }
}
