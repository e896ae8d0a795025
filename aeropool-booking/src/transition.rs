use aeropool_domain::booking::BookingStatus;
use chrono::{DateTime, Duration, Utc};

/// Who is asking for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Driver,
    Passenger,
}

/// Capacity side-effect a validated transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityEffect {
    Reserve,
    Release,
    None,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("only the {0} may perform this transition")]
    WrongActor(&'static str),
    #[error("cancellation window exceeded: less than {0}h before departure")]
    CancelWindowExceeded(i64),
    #[error("ride has already departed")]
    RideDeparted,
}

/// Hours before departure during which a passenger can no longer cancel
/// an accepted booking.
pub const BOOKING_CANCEL_WINDOW_HOURS: i64 = 24;

/// Hours before departure during which a driver can no longer cancel the
/// whole ride.
pub const RIDE_CANCEL_WINDOW_HOURS: i64 = 12;

/// Enforces the booking transition matrix:
///
/// | from \ to | accepted      | rejected | cancelled                     |
/// |-----------|---------------|----------|-------------------------------|
/// | pending   | driver, reserve | driver | passenger                     |
/// | accepted  | —             | —        | passenger, >=24h, release     |
pub fn validate_transition(
    from: BookingStatus,
    to: BookingStatus,
    actor: Actor,
    now: DateTime<Utc>,
    departure_at: DateTime<Utc>,
) -> Result<CapacityEffect, TransitionError> {
    use BookingStatus::*;

    match (from, to) {
        (Pending, Accepted) => {
            require_actor(actor, Actor::Driver, "driver")?;
            if departure_at <= now {
                return Err(TransitionError::RideDeparted);
            }
            Ok(CapacityEffect::Reserve)
        }
        (Pending, Rejected) => {
            require_actor(actor, Actor::Driver, "driver")?;
            Ok(CapacityEffect::None)
        }
        (Pending, Cancelled) => {
            require_actor(actor, Actor::Passenger, "passenger")?;
            Ok(CapacityEffect::None)
        }
        (Accepted, Cancelled) => {
            require_actor(actor, Actor::Passenger, "passenger")?;
            if departure_at - now < Duration::hours(BOOKING_CANCEL_WINDOW_HOURS) {
                return Err(TransitionError::CancelWindowExceeded(BOOKING_CANCEL_WINDOW_HOURS));
            }
            Ok(CapacityEffect::Release)
        }
        (from, to) => Err(TransitionError::InvalidTransition {
            from: from.as_str(),
            to: to.as_str(),
        }),
    }
}

/// Drivers may cancel a whole ride only while more than 12 hours remain.
pub fn validate_ride_cancel(
    now: DateTime<Utc>,
    departure_at: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if departure_at - now <= Duration::hours(RIDE_CANCEL_WINDOW_HOURS) {
        return Err(TransitionError::CancelWindowExceeded(RIDE_CANCEL_WINDOW_HOURS));
    }
    Ok(())
}

/// Passengers may resize a booking only while it is still pending; the
/// delta must fit what the ride has left.
pub fn validate_seat_change(
    status: BookingStatus,
    new_seats: i32,
    new_luggage: i32,
    seats_left: i32,
    luggage_left: i32,
) -> Result<(), TransitionError> {
    if status != BookingStatus::Pending {
        return Err(TransitionError::InvalidTransition {
            from: status.as_str(),
            to: "pending",
        });
    }
    if new_seats < 1 || new_seats > seats_left || new_luggage < 0 || new_luggage > luggage_left {
        return Err(TransitionError::InvalidTransition {
            from: "pending",
            to: "pending",
        });
    }
    Ok(())
}

fn require_actor(actual: Actor, expected: Actor, label: &'static str) -> Result<(), TransitionError> {
    if actual != expected {
        return Err(TransitionError::WrongActor(label));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn far_future(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(48)
    }

    #[test]
    fn driver_accepts_pending_with_reservation() {
        let now = Utc::now();
        let effect = validate_transition(
            BookingStatus::Pending,
            BookingStatus::Accepted,
            Actor::Driver,
            now,
            far_future(now),
        )
        .unwrap();
        assert_eq!(effect, CapacityEffect::Reserve);
    }

    #[test]
    fn passenger_cannot_accept() {
        let now = Utc::now();
        let err = validate_transition(
            BookingStatus::Pending,
            BookingStatus::Accepted,
            Actor::Passenger,
            now,
            far_future(now),
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::WrongActor("driver"));
    }

    #[test]
    fn cancel_from_accepted_releases_capacity_within_window() {
        let now = Utc::now();
        let effect = validate_transition(
            BookingStatus::Accepted,
            BookingStatus::Cancelled,
            Actor::Passenger,
            now,
            now + Duration::hours(25),
        )
        .unwrap();
        assert_eq!(effect, CapacityEffect::Release);
    }

    #[test]
    fn late_cancel_from_accepted_is_rejected() {
        let now = Utc::now();
        let err = validate_transition(
            BookingStatus::Accepted,
            BookingStatus::Cancelled,
            Actor::Passenger,
            now,
            now + Duration::hours(23),
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::CancelWindowExceeded(24));
    }

    #[test]
    fn cancel_from_pending_needs_no_capacity() {
        let now = Utc::now();
        let effect = validate_transition(
            BookingStatus::Pending,
            BookingStatus::Cancelled,
            Actor::Passenger,
            now,
            now + Duration::hours(1),
        )
        .unwrap();
        assert_eq!(effect, CapacityEffect::None);
    }

    #[test]
    fn terminal_states_are_frozen() {
        let now = Utc::now();
        for from in [BookingStatus::Rejected, BookingStatus::Cancelled] {
            for to in [BookingStatus::Pending, BookingStatus::Accepted, BookingStatus::Cancelled] {
                assert!(matches!(
                    validate_transition(from, to, Actor::Driver, now, far_future(now)),
                    Err(TransitionError::InvalidTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn ride_cancel_window_is_twelve_hours() {
        let now = Utc::now();
        assert!(validate_ride_cancel(now, now + Duration::hours(13)).is_ok());
        // 10h before departure: too late (scenario from the product rules).
        assert_eq!(
            validate_ride_cancel(now, now + Duration::hours(10)).unwrap_err(),
            TransitionError::CancelWindowExceeded(12)
        );
    }

    #[test]
    fn seat_change_only_while_pending() {
        assert!(validate_seat_change(BookingStatus::Pending, 2, 1, 3, 2).is_ok());
        assert!(validate_seat_change(BookingStatus::Accepted, 2, 1, 3, 2).is_err());
        assert!(validate_seat_change(BookingStatus::Pending, 4, 1, 3, 2).is_err());
        assert!(validate_seat_change(BookingStatus::Pending, 0, 1, 3, 2).is_err());
    }
}
