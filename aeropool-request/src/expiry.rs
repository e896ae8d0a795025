use aeropool_domain::request::{RequestStatus, RideRequest};
use chrono::{DateTime, Utc};

/// How often the background sweep looks for lapsed requests.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// A pending request past its deadline is due for the `expired` flip.
/// Terminal requests are never touched, however old.
pub fn is_due_for_expiry(request: &RideRequest, now: DateTime<Utc>) -> bool {
    request.status == RequestStatus::Pending && request.expires_at < now
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeropool_core::geo::GeoPoint;
    use aeropool_domain::booking::PaymentStatus;
    use aeropool_domain::request::{expiry_for, RequestDirection, RequestLocation};
    use chrono::Duration;
    use uuid::Uuid;

    fn request(now: DateTime<Utc>, status: RequestStatus) -> RideRequest {
        let preferred = now + Duration::hours(1);
        RideRequest {
            id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            airport_id: Uuid::new_v4(),
            direction: RequestDirection::FromAirport,
            location: RequestLocation {
                address: "Stationsplein 1".into(),
                city: "Leiden".into(),
                postcode: Some("2312 AJ".into()),
                point: GeoPoint::new(4.48, 52.16),
            },
            preferred_at: preferred,
            flexibility_minutes: 0,
            seats_needed: 1,
            luggage: 0,
            max_price_per_seat: None,
            notes: None,
            status,
            matched_driver_id: None,
            matched_ride_id: None,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            paid_amount: 0,
            psp_intent_id: None,
            expires_at: expiry_for(preferred),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pending_requests_expire_after_their_deadline() {
        let now = Utc::now();
        let req = request(now, RequestStatus::Pending);
        assert!(!is_due_for_expiry(&req, now));
        assert!(!is_due_for_expiry(&req, req.expires_at));
        assert!(is_due_for_expiry(&req, req.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn settled_requests_are_never_swept() {
        let now = Utc::now();
        for status in [RequestStatus::Accepted, RequestStatus::Cancelled, RequestStatus::Expired] {
            let req = request(now, status);
            assert!(!is_due_for_expiry(&req, req.expires_at + Duration::hours(5)));
        }
    }
}
