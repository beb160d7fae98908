//! In-memory ledger
//!
//! Behaves like the registry contract: writes validate against current
//! state and either confirm with a transaction hash or fail. Tests can
//! inject read failures, reject writes, and hold individual reads or writes
//! open to control interleaving.

use super::{LedgerError, LedgerGateway, TxResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;
use tracing::debug;
use whare_offers::{Offer, OfferStatus};
use whare_registry::{Property, PropertyId, PropertyRecord, StatusKind};

#[derive(Debug, Default)]
struct LedgerState {
    properties: Vec<PropertyRecord>,
    offers: Vec<Offer>,
    tx_count: u64,
}

/// In-memory registry contract
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    read_failure: Mutex<Option<LedgerError>>,
    write_rejections: Mutex<VecDeque<String>>,
    read_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    write_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    reads: AtomicUsize,
}

impl MemoryLedger {
    /// Empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger holding the given properties
    #[must_use]
    pub fn with_properties<I>(properties: I) -> Self
    where
        I: IntoIterator<Item = Property>,
    {
        let ledger = Self::new();
        for property in properties {
            ledger.put_property(property.to_record());
        }
        ledger
    }

    /// Insert or replace a property record directly, bypassing writes
    pub fn put_property(&self, record: PropertyRecord) {
        let mut state = self.state.lock();
        let key = PropertyId::new(&record.id).ok();
        match state
            .properties
            .iter_mut()
            .find(|r| key.is_some() && PropertyId::new(&r.id).ok() == key)
        {
            Some(slot) => *slot = record,
            None => state.properties.push(record),
        }
    }

    /// Current property records
    #[must_use]
    pub fn properties(&self) -> Vec<PropertyRecord> {
        self.state.lock().properties.clone()
    }

    /// Current offer history
    #[must_use]
    pub fn offers(&self) -> Vec<Offer> {
        self.state.lock().offers.clone()
    }

    /// Number of property reads served or attempted
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Fail every read with `error` until cleared with `None`
    pub fn fail_reads(&self, error: Option<LedgerError>) {
        *self.read_failure.lock() = error;
    }

    /// Fail the next write with `reason`
    pub fn reject_next_write(&self, reason: impl Into<String>) {
        self.write_rejections.lock().push_back(reason.into());
    }

    /// Block the next property read until the returned sender fires or drops
    pub fn hold_next_read(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.read_gates.lock().push_back(rx);
        tx
    }

    /// Block the next write until the returned sender fires or drops
    pub fn hold_next_write(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.write_gates.lock().push_back(rx);
        tx
    }

    async fn pass(gates: &Mutex<VecDeque<oneshot::Receiver<()>>>) {
        let gate = gates.lock().pop_front();
        if let Some(gate) = gate {
            // A dropped sender releases the gate too
            let _ = gate.await;
        }
    }

    fn commit<F>(&self, action: &str, apply: F) -> TxResult
    where
        F: FnOnce(&mut LedgerState) -> Result<(), String>,
    {
        if let Some(reason) = self.write_rejections.lock().pop_front() {
            debug!(action, %reason, "write rejected");
            return TxResult::Failed(reason);
        }
        let mut state = self.state.lock();
        if let Err(reason) = apply(&mut *state) {
            debug!(action, %reason, "write reverted");
            return TxResult::Failed(reason);
        }
        state.tx_count += 1;
        let tx_hash = tx_hash(state.tx_count, action);
        debug!(action, %tx_hash, "write confirmed");
        TxResult::Confirmed { tx_hash }
    }
}

fn tx_hash(count: u64, action: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(count.to_le_bytes());
    hasher.update(action.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

fn find_record<'a>(state: &'a mut LedgerState, id: &PropertyId) -> Option<&'a mut PropertyRecord> {
    state
        .properties
        .iter_mut()
        .find(|r| PropertyId::new(&r.id).is_ok_and(|rid| &rid == id))
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn read_all_properties(&self) -> Result<Vec<PropertyRecord>, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Self::pass(&self.read_gates).await;
        if let Some(error) = self.read_failure.lock().clone() {
            return Err(error);
        }
        Ok(self.properties())
    }

    async fn read_offer_history(&self) -> Result<Vec<Offer>, LedgerError> {
        if let Some(error) = self.read_failure.lock().clone() {
            return Err(error);
        }
        Ok(self.offers())
    }

    async fn submit_add_property(&self, record: &PropertyRecord) -> TxResult {
        Self::pass(&self.write_gates).await;
        self.commit(&format!("addProperty {}", record.id), |state| {
            let id = PropertyId::new(&record.id).map_err(|e| e.to_string())?;
            let mut record = record.clone();
            record.id = id.to_string();
            match find_record(state, &id) {
                Some(slot) => *slot = record,
                None => state.properties.push(record),
            }
            Ok(())
        })
    }

    async fn submit_create_offer(&self, offer: &Offer) -> TxResult {
        Self::pass(&self.write_gates).await;
        self.commit(&format!("createOffer {} {}", offer.property_id, offer.applicant_did), |state| {
            let record = find_record(state, &offer.property_id)
                .ok_or_else(|| format!("property {} not registered", offer.property_id))?;
            if record.status != StatusKind::Available {
                return Err(format!("property {} is {}", offer.property_id, record.status));
            }
            record.status = StatusKind::Offered;
            record.offered_to = Some(offer.applicant_did.to_string());
            state.offers.push(offer.clone());
            Ok(())
        })
    }

    async fn submit_offer_outcome(&self, offer: &Offer) -> TxResult {
        Self::pass(&self.write_gates).await;
        self.commit(&format!("offerOutcome {} {:?}", offer.property_id, offer.status), |state| {
            if offer.is_pending() {
                return Err("outcome must resolve the offer".to_owned());
            }
            let idx = state
                .offers
                .iter()
                .position(|o| o.same_offer(offer) && o.is_pending())
                .ok_or_else(|| format!("no pending offer on {}", offer.property_id))?;
            let record = find_record(state, &offer.property_id)
                .ok_or_else(|| format!("property {} not registered", offer.property_id))?;

            record.offered_to = None;
            if offer.status == OfferStatus::Accepted {
                record.status = StatusKind::Occupied;
                record.occupant = Some(offer.applicant_did.to_string());
                record.move_in_date = offer.responded_at.map(|t| t.date_naive());
            } else {
                record.status = StatusKind::Available;
            }
            state.offers[idx] = offer.clone();
            Ok(())
        })
    }
}
