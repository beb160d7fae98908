//! Hash-chained audit trail of confirmed ledger writes

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use whare_registry::{Did, PropertyId};

/// Audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AuditAction {
    /// Property registered
    PropertyAdded {
        /// Property
        property: PropertyId,
    },
    /// Offer created
    OfferCreated {
        /// Property
        property: PropertyId,
        /// Applicant
        applicant: Did,
    },
    /// Offer accepted
    OfferAccepted {
        /// Property
        property: PropertyId,
        /// Applicant
        applicant: Did,
    },
    /// Offer declined
    OfferDeclined {
        /// Property
        property: PropertyId,
        /// Applicant
        applicant: Did,
        /// Stated reason
        reason: String,
    },
    /// Offer expired
    OfferExpired {
        /// Property
        property: PropertyId,
        /// Applicant
        applicant: Did,
    },
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PropertyAdded { property } => write!(f, "added property {property}"),
            Self::OfferCreated { property, applicant } => {
                write!(f, "offered {property} to {applicant}")
            }
            Self::OfferAccepted { property, applicant } => {
                write!(f, "{applicant} accepted {property}")
            }
            Self::OfferDeclined {
                property,
                applicant,
                reason,
            } => write!(f, "{applicant} declined {property}: {reason}"),
            Self::OfferExpired { property, applicant } => {
                write!(f, "offer of {property} to {applicant} expired")
            }
        }
    }
}

/// One audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Position in the log, from 0
    pub seq: u64,
    /// Confirmation time
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction hash
    pub tx_hash: String,
    /// What happened
    #[serde(flatten)]
    pub action: AuditAction,
    /// Acting identity
    pub performed_by: Did,
    /// Hash of the previous entry
    pub prev_hash: [u8; 32],
    /// Hash of this entry
    pub hash: [u8; 32],
}

/// Audit log failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Chain broken or entry altered
    #[error("audit chain broken at entry {seq}")]
    IntegrityViolation {
        /// First bad entry
        seq: u64,
    },
}

/// Append-only, hash-chained audit log
#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry chained to the last one
    pub fn append(
        &self,
        timestamp: DateTime<Utc>,
        tx_hash: impl Into<String>,
        action: AuditAction,
        performed_by: Did,
    ) -> AuditEntry {
        let mut guard = self.inner.lock();
        let prev_hash = guard.last().map_or([0u8; 32], |e| e.hash);
        let mut entry = AuditEntry {
            seq: guard.len() as u64,
            timestamp,
            tx_hash: tx_hash.into(),
            action,
            performed_by,
            prev_hash,
            hash: [0u8; 32],
        };
        entry.hash = compute_hash(&entry);
        guard.push(entry.clone());
        entry
    }

    /// Snapshot of every entry
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().clone()
    }

    /// Entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if nothing was logged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Walk the chain and recompute every hash
    ///
    /// # Errors
    /// - `AuditError::IntegrityViolation` at the first altered or unlinked entry
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        let guard = self.inner.lock();
        let mut prev = [0u8; 32];
        for e in guard.iter() {
            if e.prev_hash != prev || e.hash != compute_hash(e) {
                return Err(AuditError::IntegrityViolation { seq: e.seq });
            }
            prev = e.hash;
        }
        Ok(())
    }
}

fn compute_hash(entry: &AuditEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.seq.to_le_bytes());
    hasher.update(entry.timestamp.to_rfc3339().as_bytes());
    hasher.update([0]);
    hasher.update(entry.tx_hash.as_bytes());
    hasher.update([0]);
    hasher.update(entry.action.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(entry.performed_by.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.prev_hash);
    hasher.finalize().into()
}
