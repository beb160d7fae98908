//! Optimistic mutation layer
//!
//! Local, unconfirmed changes are kept as overlays on top of the last
//! reconciled base view. The visible view is always `base` with every live
//! overlay applied in dispatch order, so:
//!
//! - rolling back an overlay recomputes the view without it, restoring the
//!   exact pre-mutation view when it was the latest;
//! - a refresh swaps the base and drops overlays the new base reflects,
//!   along with every confirmed overlay.
//!
//! [`InFlightClaims`] enforces the single-writer rule: one mutation of a
//! given kind per target property at a time. `AddProperty` never claims.

use crate::error::RegistryError;
use crate::id::{Did, PropertyId};
use crate::property::{Property, PropertyStatus, Provenance};
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use ulid::Ulid;

/// Unique mutation identifier (ULID for dispatch ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(pub Ulid);

impl MutationId {
    /// Generate new mutation ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local change applied before its ledger write confirms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// New property record
    AddProperty(Property),
    /// Property offered to an applicant
    MarkOffered {
        /// Target
        property_id: PropertyId,
        /// Offer holder
        applicant: Did,
    },
    /// Offer accepted
    MarkOccupied {
        /// Target
        property_id: PropertyId,
        /// New occupant
        occupant: Did,
        /// Move-in date
        move_in: Option<NaiveDate>,
    },
    /// Offer declined or expired
    MarkAvailable {
        /// Target
        property_id: PropertyId,
    },
}

/// Mutation discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// [`Mutation::AddProperty`]
    AddProperty,
    /// [`Mutation::MarkOffered`]
    MarkOffered,
    /// [`Mutation::MarkOccupied`]
    MarkOccupied,
    /// [`Mutation::MarkAvailable`]
    MarkAvailable,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddProperty => "AddProperty",
            Self::MarkOffered => "MarkOffered",
            Self::MarkOccupied => "MarkOccupied",
            Self::MarkAvailable => "MarkAvailable",
        };
        f.write_str(name)
    }
}

/// Key of the single-writer claim
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConflictKey {
    /// Mutation kind
    pub kind: MutationKind,
    /// Target property
    pub property: PropertyId,
}

impl Mutation {
    /// Mutation discriminant
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::AddProperty(_) => MutationKind::AddProperty,
            Self::MarkOffered { .. } => MutationKind::MarkOffered,
            Self::MarkOccupied { .. } => MutationKind::MarkOccupied,
            Self::MarkAvailable { .. } => MutationKind::MarkAvailable,
        }
    }

    /// Target property
    #[must_use]
    pub fn target(&self) -> &PropertyId {
        match self {
            Self::AddProperty(p) => &p.id,
            Self::MarkOffered { property_id, .. }
            | Self::MarkOccupied { property_id, .. }
            | Self::MarkAvailable { property_id } => property_id,
        }
    }

    /// Claim key, `None` for mutations that never conflict
    #[must_use]
    pub fn conflict_key(&self) -> Option<ConflictKey> {
        match self {
            Self::AddProperty(_) => None,
            _ => Some(ConflictKey {
                kind: self.kind(),
                property: self.target().clone(),
            }),
        }
    }

    /// Check if a view already shows this mutation's effect
    #[must_use]
    pub fn is_reflected_in(&self, view: &[Property]) -> bool {
        let Some(current) = view.iter().find(|p| &p.id == self.target()) else {
            return false;
        };
        match self {
            Self::AddProperty(_) => true,
            Self::MarkOffered { applicant, .. } => current.offered_to() == Some(applicant),
            Self::MarkOccupied { occupant, .. } => current.occupant() == Some(occupant),
            Self::MarkAvailable { .. } => current.status == PropertyStatus::Available,
        }
    }
}

/// Apply a mutation to a copy of the view
///
/// Status guards belong to the offer lifecycle; this only rewrites records.
/// A new property replaces a record with the same id in place, otherwise it
/// is appended with [`Provenance::Ledger`].
///
/// # Errors
/// - `RegistryError::UnknownProperty` if a status mutation targets an id
///   absent from the view
pub fn apply_optimistic(
    mutation: &Mutation,
    view: &[Property],
) -> Result<Vec<Property>, RegistryError> {
    let mut next = view.to_vec();

    match mutation {
        Mutation::AddProperty(record) => {
            let record = record.clone().with_provenance(Provenance::Ledger);
            match next.iter_mut().find(|p| p.id == record.id) {
                Some(existing) => *existing = record,
                None => next.push(record),
            }
        }
        Mutation::MarkOffered {
            property_id,
            applicant,
        } => {
            find_mut(&mut next, property_id)?.status =
                PropertyStatus::offered_to(applicant.clone());
        }
        Mutation::MarkOccupied {
            property_id,
            occupant,
            move_in,
        } => {
            let target = find_mut(&mut next, property_id)?;
            target.status = PropertyStatus::occupied_by(occupant.clone());
            target.move_in_date = *move_in;
        }
        Mutation::MarkAvailable { property_id } => {
            find_mut(&mut next, property_id)?.status = PropertyStatus::Available;
        }
    }

    Ok(next)
}

fn find_mut<'a>(
    view: &'a mut [Property],
    id: &PropertyId,
) -> Result<&'a mut Property, RegistryError> {
    view.iter_mut()
        .find(|p| &p.id == id)
        .ok_or_else(|| RegistryError::UnknownProperty(id.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlayState {
    InFlight,
    Confirmed,
}

#[derive(Debug, Clone)]
struct Overlay {
    id: MutationId,
    mutation: Mutation,
    state: OverlayState,
}

/// Outcome of swapping in a new base view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebaseReport {
    /// Overlays the new base made redundant
    pub superseded: usize,
    /// Confirmed overlays dropped
    pub confirmed_dropped: usize,
    /// In-flight overlays re-applied on the new base
    pub reapplied: usize,
}

/// Base view plus live optimistic overlays
#[derive(Debug, Clone, Default)]
pub struct OptimisticView {
    base: Vec<Property>,
    overlays: Vec<Overlay>,
    view: Vec<Property>,
}

impl OptimisticView {
    /// Create over a reconciled base
    #[must_use]
    pub fn new(base: Vec<Property>) -> Self {
        Self {
            view: base.clone(),
            base,
            overlays: Vec::new(),
        }
    }

    /// Visible view
    #[inline]
    #[must_use]
    pub fn view(&self) -> &[Property] {
        &self.view
    }

    /// Reconciled base without overlays
    #[inline]
    #[must_use]
    pub fn base(&self) -> &[Property] {
        &self.base
    }

    /// Number of live overlays
    #[inline]
    #[must_use]
    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    /// Check if an overlay is still live
    #[must_use]
    pub fn contains(&self, id: MutationId) -> bool {
        self.overlays.iter().any(|o| o.id == id)
    }

    /// Apply a mutation on top of the visible view
    ///
    /// # Errors
    /// Propagates [`apply_optimistic`] errors; the view is unchanged.
    pub fn apply(
        &mut self,
        id: MutationId,
        mutation: Mutation,
    ) -> Result<&[Property], RegistryError> {
        self.view = apply_optimistic(&mutation, &self.view)?;
        tracing::debug!(
            mutation = %id,
            kind = %mutation.kind(),
            target = %mutation.target(),
            "optimistic overlay applied"
        );
        self.overlays.push(Overlay {
            id,
            mutation,
            state: OverlayState::InFlight,
        });
        Ok(&self.view)
    }

    /// Mark an overlay confirmed; the next rebase drops it
    pub fn confirm(&mut self, id: MutationId) -> bool {
        match self.overlays.iter_mut().find(|o| o.id == id) {
            Some(overlay) => {
                overlay.state = OverlayState::Confirmed;
                true
            }
            None => false,
        }
    }

    /// Remove an overlay and recompute the view without it
    pub fn rollback(&mut self, id: MutationId) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|o| o.id != id);
        if self.overlays.len() == before {
            return false;
        }
        self.recompute();
        true
    }

    /// Swap in a freshly reconciled base
    pub fn rebase(&mut self, base: Vec<Property>) -> RebaseReport {
        let mut report = RebaseReport::default();
        self.overlays.retain(|o| {
            if o.state == OverlayState::Confirmed {
                report.confirmed_dropped += 1;
                false
            } else if o.mutation.is_reflected_in(&base) {
                report.superseded += 1;
                false
            } else {
                report.reapplied += 1;
                true
            }
        });
        self.base = base;
        self.recompute();
        report
    }

    fn recompute(&mut self) {
        let mut view = self.base.clone();
        let mut stale = Vec::new();
        for overlay in &self.overlays {
            match apply_optimistic(&overlay.mutation, &view) {
                Ok(next) => view = next,
                Err(e) => {
                    tracing::warn!(
                        mutation = %overlay.id,
                        error = %e,
                        "dropping overlay that no longer applies"
                    );
                    stale.push(overlay.id);
                }
            }
        }
        self.overlays.retain(|o| !stale.contains(&o.id));
        self.view = view;
    }
}

/// Single-writer claims on in-flight mutations
#[derive(Debug, Default)]
pub struct InFlightClaims {
    claims: DashMap<ConflictKey, MutationId>,
}

impl InFlightClaims {
    /// Create empty claim set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the mutation's target until [`InFlightClaims::release`]
    ///
    /// # Errors
    /// - `RegistryError::ConflictingMutation` if the same kind is already
    ///   in flight for the target
    pub fn claim(&self, mutation: &Mutation, id: MutationId) -> Result<(), RegistryError> {
        let Some(key) = mutation.conflict_key() else {
            return Ok(());
        };
        match self.claims.entry(key) {
            Entry::Occupied(held) => Err(RegistryError::ConflictingMutation {
                kind: held.key().kind,
                property: held.key().property.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    /// Release a claim held by `id`
    pub fn release(&self, mutation: &Mutation, id: MutationId) {
        if let Some(key) = mutation.conflict_key() {
            self.claims.remove_if(&key, |_, holder| *holder == id);
        }
    }

    /// Check if a kind is in flight for a property
    #[must_use]
    pub fn is_claimed(&self, kind: MutationKind, property: &PropertyId) -> bool {
        self.claims.contains_key(&ConflictKey {
            kind,
            property: property.clone(),
        })
    }

    /// Properties with at least one mutation in flight
    #[must_use]
    pub fn claimed_properties(&self) -> HashSet<PropertyId> {
        self.claims.iter().map(|e| e.key().property.clone()).collect()
    }

    /// Number of held claims
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Check if no claims are held
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
