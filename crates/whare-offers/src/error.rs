//! Error types for the offer lifecycle

use crate::lifecycle::LifecycleEvent;
use chrono::{DateTime, Utc};
use std::fmt;
use whare_registry::{PropertyId, StatusKind};

/// Offer lifecycle error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Event not allowed from the property's state, or a guard failed
    #[error("invalid transition for {property}: {event} from {from}: {guard}")]
    InvalidTransition {
        /// Target property
        property: PropertyId,
        /// Property status when the event arrived
        from: StatusKind,
        /// Rejected event
        event: LifecycleEvent,
        /// Failed guard
        guard: Guard,
    },

    /// Response attempted at or after the deadline
    #[error("offer on {property} expired at {deadline}")]
    OfferExpired {
        /// Target property
        property: PropertyId,
        /// Response deadline
        deadline: DateTime<Utc>,
    },

    /// Property is offered but no pending offer record exists
    #[error("no pending offer recorded for {0}")]
    NoOffer(PropertyId),

    /// Waitlist entries violate ordering rules
    #[error("invalid waitlist: {reason}")]
    InvalidWaitlist {
        /// Violated rule
        reason: String,
    },
}

impl LifecycleError {
    /// Check if the caller may retry after re-reading
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoOffer(_))
    }
}

/// Guard that rejected a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// Event not defined from this state
    WrongState,
    /// Property already has a pending offer
    PropertyHasPendingOffer,
    /// Applicant already holds a pending offer elsewhere
    ApplicantHasPendingOffer,
    /// Responder is not the offer's applicant
    NotOfferee,
    /// Decline reason missing
    EmptyReason,
    /// Expiry requested before the deadline
    DeadlineNotReached,
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::WrongState => "event not allowed in this state",
            Self::PropertyHasPendingOffer => "property already has a pending offer",
            Self::ApplicantHasPendingOffer => "applicant already holds a pending offer",
            Self::NotOfferee => "responder is not the offer's applicant",
            Self::EmptyReason => "decline reason is required",
            Self::DeadlineNotReached => "response deadline not reached",
        };
        f.write_str(text)
    }
}
