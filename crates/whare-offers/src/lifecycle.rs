//! Offer lifecycle state machine
//!
//! Available --createOffer--> Offered --accept--> Occupied
//!                             Offered --decline/expire--> Available
//!
//! Every (state, event) pair is decided here; anything not listed is an
//! `InvalidTransition` with no state change. Data guards (deadline,
//! responder, pending offers) are checked by the offer book.

use crate::error::{Guard, LifecycleError};
use std::fmt;
use whare_registry::{Property, PropertyStatus, StatusKind};

/// States a property moves through during an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Open for offers
    Available,
    /// Offer outstanding
    Offered,
    /// Offer accepted
    Occupied,
}

impl LifecycleState {
    /// Lifecycle state of a property status, `None` for `Pending`
    #[must_use]
    pub fn of(status: &PropertyStatus) -> Option<Self> {
        match status {
            PropertyStatus::Available => Some(Self::Available),
            PropertyStatus::Offered { .. } => Some(Self::Offered),
            PropertyStatus::Occupied { .. } => Some(Self::Occupied),
            PropertyStatus::Pending => None,
        }
    }

    /// Matching status discriminant
    #[must_use]
    pub fn status_kind(self) -> StatusKind {
        match self {
            Self::Available => StatusKind::Available,
            Self::Offered => StatusKind::Offered,
            Self::Occupied => StatusKind::Occupied,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_kind().label())
    }
}

/// Lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// CHP offers the property
    CreateOffer,
    /// Applicant accepts
    Accept,
    /// Applicant declines
    Decline,
    /// Deadline passed without response
    Expire,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateOffer => "createOffer",
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Expire => "expire",
        };
        f.write_str(name)
    }
}

/// Events accepted from a state
#[must_use]
pub fn allowed_events(from: LifecycleState) -> Vec<LifecycleEvent> {
    use LifecycleEvent::{Accept, CreateOffer, Decline, Expire};
    match from {
        LifecycleState::Available => vec![CreateOffer],
        LifecycleState::Offered => vec![Accept, Decline, Expire],
        LifecycleState::Occupied => vec![],
    }
}

/// Target state of an event, if defined
#[must_use]
pub fn target_state(from: LifecycleState, event: LifecycleEvent) -> Option<LifecycleState> {
    use LifecycleEvent::{Accept, CreateOffer, Decline, Expire};
    match (from, event) {
        (LifecycleState::Available, CreateOffer) => Some(LifecycleState::Offered),
        (LifecycleState::Offered, Accept) => Some(LifecycleState::Occupied),
        (LifecycleState::Offered, Decline | Expire) => Some(LifecycleState::Available),
        _ => None,
    }
}

/// Structural check of an event against a property's current status
///
/// # Errors
/// - `LifecycleError::InvalidTransition` with [`Guard::WrongState`]
pub fn transition(
    property: &Property,
    event: LifecycleEvent,
) -> Result<LifecycleState, LifecycleError> {
    LifecycleState::of(&property.status)
        .and_then(|from| target_state(from, event))
        .ok_or_else(|| LifecycleError::InvalidTransition {
            property: property.id.clone(),
            from: property.status_kind(),
            event,
            guard: Guard::WrongState,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use whare_registry::{Did, PropertyId};

    fn property(status: PropertyStatus) -> Property {
        Property::new(PropertyId::new("H1").unwrap(), "1 Test St", 1, 1).with_status(status)
    }

    #[test]
    fn available_transitions() {
        let p = property(PropertyStatus::Available);
        assert_eq!(
            transition(&p, LifecycleEvent::CreateOffer).unwrap(),
            LifecycleState::Offered
        );
        assert!(transition(&p, LifecycleEvent::Accept).is_err());
        assert!(transition(&p, LifecycleEvent::Expire).is_err());
    }

    #[test]
    fn offered_transitions() {
        let p = property(PropertyStatus::offered_to(Did::new("A1")));
        assert_eq!(transition(&p, LifecycleEvent::Accept).unwrap(), LifecycleState::Occupied);
        assert_eq!(transition(&p, LifecycleEvent::Decline).unwrap(), LifecycleState::Available);
        assert_eq!(transition(&p, LifecycleEvent::Expire).unwrap(), LifecycleState::Available);
        assert!(transition(&p, LifecycleEvent::CreateOffer).is_err());
    }

    #[test]
    fn occupied_and_pending_are_terminal() {
        for status in [PropertyStatus::occupied_by(Did::new("A1")), PropertyStatus::Pending] {
            let p = property(status);
            for event in [
                LifecycleEvent::CreateOffer,
                LifecycleEvent::Accept,
                LifecycleEvent::Decline,
                LifecycleEvent::Expire,
            ] {
                let err = transition(&p, event).unwrap_err();
                assert!(matches!(
                    err,
                    LifecycleError::InvalidTransition {
                        guard: Guard::WrongState,
                        ..
                    }
                ));
            }
        }
    }
}
