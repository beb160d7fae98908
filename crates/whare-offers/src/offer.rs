//! Offer records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use whare_registry::{Did, PropertyId};

/// Fixed response window in days
pub const DEFAULT_RESPONSE_WINDOW_DAYS: i64 = 7;

/// Offer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferStatus {
    /// Awaiting the applicant
    Pending,
    /// Applicant accepted
    Accepted,
    /// Applicant declined
    Declined,
    /// Deadline passed without response
    Expired,
}

impl OfferStatus {
    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Time-bounded proposal of one property to one applicant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    /// Offered property
    pub property_id: PropertyId,
    /// Applicant receiving the offer
    pub applicant_did: Did,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// `created_at` plus the response window
    pub response_deadline: DateTime<Utc>,
    /// Status
    pub status: OfferStatus,
    /// Required when declined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
    /// When the offer was accepted, declined or expired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    /// Free-text notes from the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Offer {
    /// New pending offer
    #[must_use]
    pub fn new(
        property_id: PropertyId,
        applicant_did: Did,
        created_at: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            property_id,
            applicant_did,
            created_at,
            response_deadline: created_at
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            status: OfferStatus::Pending,
            decline_reason: None,
            responded_at: None,
            notes: None,
        }
    }

    /// With provider notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        let notes = notes.into();
        self.notes = (!notes.trim().is_empty()).then_some(notes);
        self
    }

    /// Check if awaiting a response
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == OfferStatus::Pending
    }

    /// Check if the deadline has passed at `now`
    #[inline]
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.response_deadline
    }

    /// Check if two records describe the same offer
    #[must_use]
    pub fn same_offer(&self, other: &Offer) -> bool {
        self.property_id == other.property_id
            && self.applicant_did == other.applicant_did
            && self.created_at == other.created_at
    }
}
