//! Ledger gateway
//!
//! Opaque access to the registry contract. The engine only ever talks to
//! the ledger through [`LedgerGateway`]; [`MemoryLedger`] backs tests and
//! the demo binary.

mod memory;

pub use memory::MemoryLedger;

use async_trait::async_trait;
use whare_offers::Offer;
use whare_registry::PropertyRecord;

/// Ledger read failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No answer in time
    #[error("ledger read timed out")]
    Timeout,
    /// Answer could not be decoded
    #[error("malformed ledger response: {0}")]
    Malformed(String),
    /// Transport or node failure
    #[error("ledger unreachable: {0}")]
    Unreachable(String),
}

/// Outcome of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResult {
    /// Mined
    Confirmed {
        /// Transaction hash
        tx_hash: String,
    },
    /// Reverted or never sent
    Failed(String),
}

impl TxResult {
    /// Check if the transaction was mined
    #[inline]
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Read/write access to the registry contract
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Every property record on the ledger
    async fn read_all_properties(&self) -> Result<Vec<PropertyRecord>, LedgerError>;

    /// Every offer ever recorded
    async fn read_offer_history(&self) -> Result<Vec<Offer>, LedgerError>;

    /// Register a property
    async fn submit_add_property(&self, record: &PropertyRecord) -> TxResult;

    /// Record a new pending offer
    async fn submit_create_offer(&self, offer: &Offer) -> TxResult;

    /// Record an accept, decline or expiry
    async fn submit_offer_outcome(&self, offer: &Offer) -> TxResult;
}
