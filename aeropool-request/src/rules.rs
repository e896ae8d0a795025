use aeropool_domain::request::{Offer, OfferStatus, RideRequest};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OfferError {
    #[error("request is no longer open for offers")]
    RequestClosed,
    #[error("request has expired")]
    RequestExpired,
    #[error("drivers cannot bid on their own request")]
    SelfOffer,
    #[error("price_per_seat must be positive")]
    BadPrice,
    #[error("offer does not belong to this request")]
    ForeignOffer,
    #[error("offer is not pending")]
    OfferNotPending,
    #[error("only the request owner may do this")]
    NotRequestOwner,
    #[error("only the offering driver may do this")]
    NotOfferOwner,
}

/// Checks a driver's bid before it is persisted. The one-pending-offer-
/// per-driver rule is enforced by the store's unique index.
pub fn validate_offer(
    request: &RideRequest,
    driver_id: Uuid,
    price_per_seat: i64,
    now: DateTime<Utc>,
) -> Result<(), OfferError> {
    if request.passenger_id == driver_id {
        return Err(OfferError::SelfOffer);
    }
    if now >= request.expires_at {
        return Err(OfferError::RequestExpired);
    }
    if !request.is_open(now) {
        return Err(OfferError::RequestClosed);
    }
    if price_per_seat <= 0 {
        return Err(OfferError::BadPrice);
    }
    Ok(())
}

/// What a paid acceptance settles and flips, computed up front so payment
/// runs before any state mutates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptPlan {
    pub offer_id: Uuid,
    pub driver_id: Uuid,
    pub ride_id: Option<Uuid>,
    /// Gross to collect from the passenger: price x seats_needed.
    pub total: i64,
}

/// Validates that `offer` can be accepted on `request` by `passenger_id`
/// and derives the amount due.
pub fn plan_acceptance(
    request: &RideRequest,
    offer: &Offer,
    passenger_id: Uuid,
    now: DateTime<Utc>,
) -> Result<AcceptPlan, OfferError> {
    if request.passenger_id != passenger_id {
        return Err(OfferError::NotRequestOwner);
    }
    if offer.request_id != request.id {
        return Err(OfferError::ForeignOffer);
    }
    if now >= request.expires_at {
        return Err(OfferError::RequestExpired);
    }
    if !request.is_open(now) {
        return Err(OfferError::RequestClosed);
    }
    if offer.status != OfferStatus::Pending {
        return Err(OfferError::OfferNotPending);
    }
    Ok(AcceptPlan {
        offer_id: offer.id,
        driver_id: offer.driver_id,
        ride_id: offer.ride_id,
        total: offer.price_per_seat * request.seats_needed as i64,
    })
}

/// A passenger rejecting one offer, without closing the request.
pub fn validate_rejection(
    request: &RideRequest,
    offer: &Offer,
    passenger_id: Uuid,
) -> Result<(), OfferError> {
    if request.passenger_id != passenger_id {
        return Err(OfferError::NotRequestOwner);
    }
    if offer.request_id != request.id {
        return Err(OfferError::ForeignOffer);
    }
    if offer.status != OfferStatus::Pending {
        return Err(OfferError::OfferNotPending);
    }
    Ok(())
}

/// A driver pulling their own pending bid.
pub fn validate_withdrawal(offer: &Offer, driver_id: Uuid) -> Result<(), OfferError> {
    if offer.driver_id != driver_id {
        return Err(OfferError::NotOfferOwner);
    }
    if offer.status != OfferStatus::Pending {
        return Err(OfferError::OfferNotPending);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeropool_core::geo::GeoPoint;
    use aeropool_domain::booking::PaymentStatus;
    use aeropool_domain::request::{
        expiry_for, RequestDirection, RequestLocation, RequestStatus,
    };
    use chrono::Duration;

    fn request(now: DateTime<Utc>) -> RideRequest {
        let preferred = now + Duration::hours(2);
        RideRequest {
            id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            airport_id: Uuid::new_v4(),
            direction: RequestDirection::ToAirport,
            location: RequestLocation {
                address: "Main St 1".into(),
                city: "Utrecht".into(),
                postcode: None,
                point: GeoPoint::new(5.12, 52.09),
            },
            preferred_at: preferred,
            flexibility_minutes: 15,
            seats_needed: 2,
            luggage: 1,
            max_price_per_seat: Some(2000),
            notes: None,
            status: RequestStatus::Pending,
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

    fn offer(request: &RideRequest, price: i64) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            request_id: request.id,
            driver_id: Uuid::new_v4(),
            ride_id: None,
            price_per_seat: price,
            message: None,
            status: OfferStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn offers_allowed_only_while_open() {
        let now = Utc::now();
        let mut req = request(now);
        let driver = Uuid::new_v4();
        assert!(validate_offer(&req, driver, 1500, now).is_ok());

        assert_eq!(
            validate_offer(&req, driver, 1500, req.expires_at),
            Err(OfferError::RequestExpired)
        );
        req.status = RequestStatus::Cancelled;
        assert_eq!(validate_offer(&req, driver, 1500, now), Err(OfferError::RequestClosed));
    }

    #[test]
    fn own_request_and_bad_price_rejected() {
        let now = Utc::now();
        let req = request(now);
        assert_eq!(
            validate_offer(&req, req.passenger_id, 1500, now),
            Err(OfferError::SelfOffer)
        );
        assert_eq!(
            validate_offer(&req, Uuid::new_v4(), 0, now),
            Err(OfferError::BadPrice)
        );
    }

    #[test]
    fn acceptance_totals_price_times_seats() {
        let now = Utc::now();
        let req = request(now);
        let off = offer(&req, 1500);
        let plan = plan_acceptance(&req, &off, req.passenger_id, now).unwrap();
        assert_eq!(plan.total, 3000);
        assert_eq!(plan.driver_id, off.driver_id);
    }

    #[test]
    fn only_the_owner_accepts_and_only_pending_offers() {
        let now = Utc::now();
        let req = request(now);
        let mut off = offer(&req, 1500);
        assert_eq!(
            plan_acceptance(&req, &off, Uuid::new_v4(), now),
            Err(OfferError::NotRequestOwner)
        );
        off.status = OfferStatus::Rejected;
        assert_eq!(
            plan_acceptance(&req, &off, req.passenger_id, now),
            Err(OfferError::OfferNotPending)
        );
    }

    #[test]
    fn withdrawal_requires_the_offering_driver() {
        let now = Utc::now();
        let req = request(now);
        let off = offer(&req, 1200);
        assert!(validate_withdrawal(&off, off.driver_id).is_ok());
        assert_eq!(
            validate_withdrawal(&off, Uuid::new_v4()),
            Err(OfferError::NotOfferOwner)
        );
    }
}
