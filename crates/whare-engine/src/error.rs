//! Error types for the registry engine

use crate::actor::Role;
use std::fmt;
use whare_offers::LifecycleError;
use whare_registry::{Did, RegistryError};

/// Engine error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Reconciliation or optimistic layer failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Offer lifecycle rejection
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Ledger answered `Failed`; the optimistic change was rolled back
    #[error("ledger rejected write: {reason}")]
    WriteRejected {
        /// Ledger-supplied reason
        reason: String,
    },

    /// Role or identity may not perform the action
    #[error("{actor} ({role}) may not {action}")]
    Unauthorized {
        /// Acting identity
        actor: Did,
        /// Acting role
        role: Role,
        /// Attempted action
        action: &'static str,
    },

    /// Applicant is not on the waitlist
    #[error("applicant {0} is not on the waitlist")]
    UnknownApplicant(Did),

    /// The view was closed before the operation resolved
    #[error("view closed before the operation resolved")]
    ViewClosed,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Flat discriminant of [`EngineError`] for callers that branch on kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Ledger read failed, fallback shown
    SourceUnavailable,
    /// Same mutation already in flight
    ConflictingMutation,
    /// Property id not in the view
    UnknownProperty,
    /// Malformed record
    InvalidRecord,
    /// Event rejected by the state machine
    InvalidTransition,
    /// Response after the deadline
    OfferExpired,
    /// Offered property without an offer record
    NoOffer,
    /// Waitlist rule violated
    InvalidWaitlist,
    /// Ledger rejected the write
    WriteRejected,
    /// Role check failed
    Unauthorized,
    /// Applicant not waitlisted
    UnknownApplicant,
    /// View torn down
    ViewClosed,
    /// Bad configuration
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl EngineError {
    /// Error discriminant
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(e) => match e {
                RegistryError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
                RegistryError::ConflictingMutation { .. } => ErrorKind::ConflictingMutation,
                RegistryError::UnknownProperty(_) => ErrorKind::UnknownProperty,
                RegistryError::InvalidRecord { .. } => ErrorKind::InvalidRecord,
            },
            Self::Lifecycle(e) => match e {
                LifecycleError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
                LifecycleError::OfferExpired { .. } => ErrorKind::OfferExpired,
                LifecycleError::NoOffer(_) => ErrorKind::NoOffer,
                LifecycleError::InvalidWaitlist { .. } => ErrorKind::InvalidWaitlist,
            },
            Self::WriteRejected { .. } => ErrorKind::WriteRejected,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::UnknownApplicant(_) => ErrorKind::UnknownApplicant,
            Self::ViewClosed => ErrorKind::ViewClosed,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_retryable(),
            Self::Lifecycle(e) => e.is_retryable(),
            Self::WriteRejected { .. } => true,
            _ => false,
        }
    }

    /// Create configuration error
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
