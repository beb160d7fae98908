//! Error types for the registry
//!
//! Every rejected registry operation surfaces as a [`RegistryError`]; none
//! of them are fatal, the caller may retry or re-read.

use crate::id::PropertyId;
use crate::optimistic::MutationKind;

/// Registry error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Ledger read failed; the view degraded to the fallback catalog
    #[error("ledger source unavailable: {reason}")]
    SourceUnavailable {
        /// Why the read failed (timeout, malformed response, ...)
        reason: String,
    },

    /// A mutation of the same kind is already in flight for the target
    #[error("conflicting {kind} mutation already in flight for {property}")]
    ConflictingMutation {
        /// Kind of the in-flight mutation
        kind: MutationKind,
        /// Targeted property
        property: PropertyId,
    },

    /// Mutation targets a property absent from the view
    #[error("unknown property: {0}")]
    UnknownProperty(PropertyId),

    /// Record violates the property data model
    #[error("invalid record: {reason}")]
    InvalidRecord {
        /// Violated rule
        reason: String,
    },
}

impl RegistryError {
    /// Build an [`RegistryError::InvalidRecord`]
    #[inline]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Check if retrying the same operation later can succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::ConflictingMutation { .. }
        )
    }
}
