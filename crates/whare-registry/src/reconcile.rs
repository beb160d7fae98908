//! Ledger/fallback reconciliation
//!
//! [`merge`] is the pure merge policy; [`Reconciler`] owns the fallback
//! catalog and turns a ledger read (successful or not) into a
//! [`Reconciliation`].
//!
//! # Ordering
//! Fallback-only records come first in catalog order, followed by every
//! ledger record in ledger-returned order. A fallback record whose id is
//! also on the ledger is dropped.

use crate::error::RegistryError;
use crate::id::PropertyId;
use crate::property::{Property, Provenance};
use indexmap::IndexMap;
use std::fmt;

/// Merge ledger records over the fallback catalog
///
/// Ids are compared in canonical form. Duplicate ids inside one source
/// collapse to the first position with the last record's data.
#[must_use]
pub fn merge(ledger: &[Property], fallback: &[Property]) -> Vec<Property> {
    let ledger = dedupe(ledger);
    let fallback = dedupe(fallback);

    let mut merged: Vec<Property> = fallback
        .into_values()
        .filter(|p| !ledger.contains_key(&p.id))
        .collect();
    merged.extend(ledger.into_values());
    merged
}

fn dedupe(records: &[Property]) -> IndexMap<PropertyId, Property> {
    let mut out = IndexMap::with_capacity(records.len());
    for record in records {
        out.insert(record.id.clone(), record.clone());
    }
    out
}

/// Result of reconciling one ledger read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Merged view
    pub properties: Vec<Property>,
    /// Set when the ledger read failed and only the fallback is shown
    pub unavailable: Option<RegistryError>,
}

impl Reconciliation {
    /// Check if this is a fallback-only view
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.unavailable.is_some()
    }
}

/// Owner of the fallback catalog
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    fallback: Vec<Property>,
}

impl Reconciler {
    /// Create reconciler over a fallback catalog
    ///
    /// Every catalog record is tagged [`Provenance::Fallback`].
    #[must_use]
    pub fn new(fallback: Vec<Property>) -> Self {
        let fallback = fallback
            .into_iter()
            .map(|p| p.with_provenance(Provenance::Fallback))
            .collect();
        Self { fallback }
    }

    /// Fallback catalog
    #[inline]
    #[must_use]
    pub fn fallback(&self) -> &[Property] {
        &self.fallback
    }

    /// Reconcile a ledger read against the fallback catalog
    ///
    /// A failed read yields the fallback catalog alone plus a
    /// `SourceUnavailable` condition. An empty read is valid.
    pub fn reconcile<E: fmt::Display>(
        &self,
        ledger_read: Result<Vec<Property>, E>,
    ) -> Reconciliation {
        match ledger_read {
            Ok(records) => {
                let ledger: Vec<Property> = records
                    .into_iter()
                    .map(|p| p.with_provenance(Provenance::Ledger))
                    .collect();
                let properties = merge(&ledger, &self.fallback);
                tracing::debug!(
                    ledger = ledger.len(),
                    fallback = self.fallback.len(),
                    merged = properties.len(),
                    "reconciled registry view"
                );
                Reconciliation {
                    properties,
                    unavailable: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "ledger read failed, serving fallback catalog");
                Reconciliation {
                    properties: merge(&[], &self.fallback),
                    unavailable: Some(RegistryError::SourceUnavailable {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }
}
