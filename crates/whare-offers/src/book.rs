//! Offer book
//!
//! Holds every offer seen in the session and enforces the data guards of
//! the lifecycle: one pending offer per property, one pending offer per
//! applicant, responder identity, deadline and decline reason.

use crate::error::{Guard, LifecycleError};
use crate::lifecycle::{transition, LifecycleEvent};
use crate::offer::{Offer, OfferStatus, DEFAULT_RESPONSE_WINDOW_DAYS};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::{debug, info};
use whare_registry::{Did, Property, PropertyId};

/// Offers of the session, in creation order
#[derive(Debug, Clone)]
pub struct OfferBook {
    window: Duration,
    offers: Vec<Offer>,
}

impl Default for OfferBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OfferBook {
    /// Empty book with the default 7-day response window
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(Duration::days(DEFAULT_RESPONSE_WINDOW_DAYS))
    }

    /// Empty book with a custom response window
    #[inline]
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            offers: Vec::new(),
        }
    }

    /// Response window applied to new offers
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// All offers, oldest first
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[Offer] {
        &self.offers
    }

    /// Offer count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    /// Check if no offer was ever recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    /// Pending offer on a property
    #[must_use]
    pub fn pending_for_property(&self, property: &PropertyId) -> Option<&Offer> {
        self.offers
            .iter()
            .find(|o| o.is_pending() && &o.property_id == property)
    }

    /// Pending offer held by an applicant, on any property
    #[must_use]
    pub fn pending_for_applicant(&self, applicant: &Did) -> Option<&Offer> {
        self.offers
            .iter()
            .find(|o| o.is_pending() && &o.applicant_did == applicant)
    }

    /// Most recent offer on a property, any status
    #[must_use]
    pub fn latest_for_property(&self, property: &PropertyId) -> Option<&Offer> {
        self.offers.iter().rev().find(|o| &o.property_id == property)
    }

    /// Pending offers whose deadline has passed at `now`
    #[must_use]
    pub fn due_for_expiry(&self, now: DateTime<Utc>) -> Vec<Offer> {
        self.offers
            .iter()
            .filter(|o| o.is_pending() && o.is_past_deadline(now))
            .cloned()
            .collect()
    }

    /// Create a pending offer
    ///
    /// # Errors
    /// - `InvalidTransition` (`WrongState`) if the property is not available
    /// - `InvalidTransition` (`PropertyHasPendingOffer`) if the property already has one
    /// - `InvalidTransition` (`ApplicantHasPendingOffer`) if the applicant holds one anywhere
    pub fn create_offer(
        &mut self,
        property: &Property,
        applicant: Did,
        now: DateTime<Utc>,
    ) -> Result<Offer, LifecycleError> {
        transition(property, LifecycleEvent::CreateOffer)?;

        if self.pending_for_property(&property.id).is_some() {
            return Err(rejected(
                property,
                LifecycleEvent::CreateOffer,
                Guard::PropertyHasPendingOffer,
            ));
        }
        if self.pending_for_applicant(&applicant).is_some() {
            return Err(rejected(
                property,
                LifecycleEvent::CreateOffer,
                Guard::ApplicantHasPendingOffer,
            ));
        }

        let offer = Offer::new(property.id.clone(), applicant, now, self.window);
        info!(
            property = %offer.property_id,
            applicant = %offer.applicant_did,
            deadline = %offer.response_deadline,
            "offer created"
        );
        self.offers.push(offer.clone());
        Ok(offer)
    }

    /// Record the applicant's acceptance
    ///
    /// # Errors
    /// - `InvalidTransition` if the property is not offered or the responder is not the offeree
    /// - `NoOffer` if no pending offer is recorded for the property
    /// - `OfferExpired` at or after the deadline
    pub fn accept(
        &mut self,
        property: &Property,
        responder: &Did,
        now: DateTime<Utc>,
    ) -> Result<Offer, LifecycleError> {
        let idx = self.respondable(property, responder, LifecycleEvent::Accept, now)?;
        let offer = &mut self.offers[idx];
        offer.status = OfferStatus::Accepted;
        offer.responded_at = Some(now);
        info!(property = %offer.property_id, applicant = %offer.applicant_did, "offer accepted");
        Ok(offer.clone())
    }

    /// Record the applicant's decline
    ///
    /// # Errors
    /// - `InvalidTransition` if the property is not offered, the responder is
    ///   not the offeree, or `reason` is blank
    /// - `NoOffer` if no pending offer is recorded for the property
    /// - `OfferExpired` at or after the deadline
    pub fn decline(
        &mut self,
        property: &Property,
        responder: &Did,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Offer, LifecycleError> {
        let idx = self.respondable(property, responder, LifecycleEvent::Decline, now)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(rejected(property, LifecycleEvent::Decline, Guard::EmptyReason));
        }
        let offer = &mut self.offers[idx];
        offer.status = OfferStatus::Declined;
        offer.decline_reason = Some(reason.to_owned());
        offer.responded_at = Some(now);
        info!(
            property = %offer.property_id,
            applicant = %offer.applicant_did,
            reason,
            "offer declined"
        );
        Ok(offer.clone())
    }

    /// Expire the pending offer on a property
    ///
    /// Returns `Ok(None)` when the latest offer on the property is already
    /// expired, so repeated calls are harmless.
    ///
    /// # Errors
    /// - `InvalidTransition` if the property is not offered or the deadline is in the future
    /// - `NoOffer` if the property is offered without a recorded offer
    pub fn expire(
        &mut self,
        property: &Property,
        now: DateTime<Utc>,
    ) -> Result<Option<Offer>, LifecycleError> {
        let Some(idx) = self.pending_index(&property.id) else {
            if self
                .latest_for_property(&property.id)
                .is_some_and(|o| o.status == OfferStatus::Expired)
            {
                debug!(property = %property.id, "offer already expired");
                return Ok(None);
            }
            transition(property, LifecycleEvent::Expire)?;
            return Err(LifecycleError::NoOffer(property.id.clone()));
        };

        transition(property, LifecycleEvent::Expire)?;
        if !self.offers[idx].is_past_deadline(now) {
            return Err(rejected(property, LifecycleEvent::Expire, Guard::DeadlineNotReached));
        }

        let offer = &mut self.offers[idx];
        offer.status = OfferStatus::Expired;
        offer.responded_at = Some(now);
        info!(property = %offer.property_id, applicant = %offer.applicant_did, "offer expired");
        Ok(Some(offer.clone()))
    }

    /// Insert an offer, replacing the record of the same offer if present
    pub fn upsert(&mut self, offer: Offer) {
        match self.offers.iter_mut().find(|o| o.same_offer(&offer)) {
            Some(slot) => *slot = offer,
            None => self.offers.push(offer),
        }
    }

    /// Remove an offer record, returning whether it was present
    pub fn remove(&mut self, offer: &Offer) -> bool {
        let before = self.offers.len();
        self.offers.retain(|o| !o.same_offer(offer));
        before != self.offers.len()
    }

    /// Replace the book with ledger history
    ///
    /// Offers on properties in `local` keep their local records, since a
    /// write for them is still in flight.
    pub fn reconcile(&mut self, ledger: Vec<Offer>, local: &HashSet<PropertyId>) {
        let mut merged: Vec<Offer> = ledger
            .into_iter()
            .filter(|o| !local.contains(&o.property_id))
            .collect();
        merged.extend(
            self.offers
                .iter()
                .filter(|o| local.contains(&o.property_id))
                .cloned(),
        );
        merged.sort_by_key(|o| o.created_at);
        debug!(offers = merged.len(), kept_local = local.len(), "offer history reconciled");
        self.offers = merged;
    }

    fn pending_index(&self, property: &PropertyId) -> Option<usize> {
        self.offers
            .iter()
            .position(|o| o.is_pending() && &o.property_id == property)
    }

    /// Shared checks for accept and decline: state, offer, responder, deadline
    fn respondable(
        &self,
        property: &Property,
        responder: &Did,
        event: LifecycleEvent,
        now: DateTime<Utc>,
    ) -> Result<usize, LifecycleError> {
        transition(property, event)?;
        let idx = self
            .pending_index(&property.id)
            .ok_or_else(|| LifecycleError::NoOffer(property.id.clone()))?;
        let offer = &self.offers[idx];
        if &offer.applicant_did != responder {
            return Err(rejected(property, event, Guard::NotOfferee));
        }
        if offer.is_past_deadline(now) {
            return Err(LifecycleError::OfferExpired {
                property: property.id.clone(),
                deadline: offer.response_deadline,
            });
        }
        Ok(idx)
    }
}

fn rejected(property: &Property, event: LifecycleEvent, guard: Guard) -> LifecycleError {
    LifecycleError::InvalidTransition {
        property: property.id.clone(),
        from: property.status_kind(),
        event,
        guard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use whare_registry::PropertyStatus;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap()
    }

    fn property(id: &str, status: PropertyStatus) -> Property {
        Property::new(PropertyId::new(id).unwrap(), "1 Test St", 2, 1).with_status(status)
    }

    fn offered(id: &str, to: &str) -> Property {
        property(id, PropertyStatus::offered_to(Did::new(to)))
    }

    #[test]
    fn create_requires_available() {
        let mut book = OfferBook::new();
        let err = book
            .create_offer(&property("H1", PropertyStatus::Pending), Did::new("A1"), t0())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { guard: Guard::WrongState, .. }));
        assert!(book.is_empty());
    }

    #[test]
    fn one_pending_offer_per_applicant() {
        let mut book = OfferBook::new();
        book.create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        let err = book
            .create_offer(&property("H2", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition { guard: Guard::ApplicantHasPendingOffer, .. }
        ));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn one_pending_offer_per_property() {
        let mut book = OfferBook::new();
        // A stale view can still show the property as available
        let p = property("H1", PropertyStatus::Available);
        book.create_offer(&p, Did::new("A1"), t0()).unwrap();
        let err = book.create_offer(&p, Did::new("A2"), t0()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition { guard: Guard::PropertyHasPendingOffer, .. }
        ));
    }

    #[test]
    fn accept_before_deadline() {
        let mut book = OfferBook::new();
        book.create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        let accepted = book
            .accept(&offered("H1", "A1"), &Did::new("A1"), t0() + Duration::days(6))
            .unwrap();
        assert_eq!(accepted.status, OfferStatus::Accepted);
        assert_eq!(accepted.responded_at, Some(t0() + Duration::days(6)));
        assert!(book.pending_for_applicant(&Did::new("A1")).is_none());
    }

    #[test]
    fn accept_at_deadline_is_expired() {
        let mut book = OfferBook::new();
        book.create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        let err = book
            .accept(&offered("H1", "A1"), &Did::new("A1"), t0() + Duration::days(7))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::OfferExpired { .. }));
        assert!(book.pending_for_property(&PropertyId::new("H1").unwrap()).is_some());
    }

    #[test]
    fn only_offeree_may_respond() {
        let mut book = OfferBook::new();
        book.create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        let err = book
            .decline(&offered("H1", "A1"), &Did::new("A2"), "no", t0())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { guard: Guard::NotOfferee, .. }));
    }

    #[test]
    fn decline_requires_reason() {
        let mut book = OfferBook::new();
        book.create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        let err = book
            .decline(&offered("H1", "A1"), &Did::new("A1"), "  ", t0())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { guard: Guard::EmptyReason, .. }));

        let declined = book
            .decline(&offered("H1", "A1"), &Did::new("A1"), " too far from work ", t0())
            .unwrap();
        assert_eq!(declined.decline_reason.as_deref(), Some("too far from work"));
    }

    #[test]
    fn offered_without_record_is_no_offer() {
        let mut book = OfferBook::new();
        let err = book
            .accept(&offered("H1", "A1"), &Did::new("A1"), t0())
            .unwrap_err();
        assert_eq!(err, LifecycleError::NoOffer(PropertyId::new("H1").unwrap()));
        assert!(err.is_retryable());
    }

    #[test]
    fn expire_waits_for_deadline_and_is_idempotent() {
        let mut book = OfferBook::new();
        book.create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        let p = offered("H1", "A1");

        let early = book.expire(&p, t0() + Duration::days(3)).unwrap_err();
        assert!(matches!(
            early,
            LifecycleError::InvalidTransition { guard: Guard::DeadlineNotReached, .. }
        ));

        let late = t0() + Duration::days(8);
        let expired = book.expire(&p, late).unwrap().unwrap();
        assert_eq!(expired.status, OfferStatus::Expired);

        assert_eq!(book.expire(&p, late).unwrap(), None);
        assert_eq!(book.expire(&property("H1", PropertyStatus::Available), late).unwrap(), None);
    }

    #[test]
    fn expire_on_available_without_history_is_invalid() {
        let mut book = OfferBook::new();
        let err = book
            .expire(&property("H1", PropertyStatus::Available), t0())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { guard: Guard::WrongState, .. }));
    }

    #[test]
    fn due_for_expiry_lists_only_overdue_pending() {
        let mut book = OfferBook::new();
        book.create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        book.create_offer(
            &property("H2", PropertyStatus::Available),
            Did::new("A2"),
            t0() + Duration::days(5),
        )
        .unwrap();

        let due = book.due_for_expiry(t0() + Duration::days(7));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].property_id.as_str(), "H1");
    }

    #[test]
    fn upsert_and_remove_match_on_identity() {
        let mut book = OfferBook::new();
        let offer = book
            .create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();
        let accepted = book.accept(&offered("H1", "A1"), &Did::new("A1"), t0()).unwrap();

        book.upsert(offer.clone());
        assert_eq!(book.len(), 1);
        assert!(book.history()[0].is_pending());

        assert!(book.remove(&accepted));
        assert!(book.is_empty());
    }

    #[test]
    fn reconcile_keeps_local_offers_for_claimed_properties() {
        let mut book = OfferBook::new();
        let local = book
            .create_offer(&property("H1", PropertyStatus::Available), Did::new("A1"), t0())
            .unwrap();

        let ledger_offer = Offer::new(
            PropertyId::new("H2").unwrap(),
            Did::new("A2"),
            t0() - Duration::days(1),
            Duration::days(7),
        );

        let claimed: HashSet<PropertyId> = [PropertyId::new("H1").unwrap()].into_iter().collect();
        book.reconcile(vec![ledger_offer.clone()], &claimed);
        assert_eq!(book.history(), &[ledger_offer.clone(), local][..]);

        book.reconcile(vec![ledger_offer.clone()], &HashSet::new());
        assert_eq!(book.history(), &[ledger_offer][..]);
    }
}
