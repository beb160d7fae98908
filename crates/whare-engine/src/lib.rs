//! WhareChain Registry Engine
//!
//! Keeps a dashboard's view of the housing registry consistent with the
//! ledger: reconciles ledger reads with the fallback catalog, shows writes
//! optimistically until the ledger confirms them, drives the offer
//! lifecycle and refreshes on a schedule while a view is open.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use whare_engine::{ActorContext, Command, EngineConfig, MemoryLedger, RegistryEngine};
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let engine = Arc::new(RegistryEngine::new(EngineConfig::default(), ledger)?);
//! let session = engine.open_view();
//! let mut events = engine.subscribe();
//!
//! session
//!     .dispatch(ActorContext::chp("[0x...CHP1]"), Command::CreateOffer {
//!         property_id: "H1235".parse()?,
//!         applicant: "[0x...B8F2]".into(),
//!         notes: None,
//!     })
//!     .await?;
//! session.close().await;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod actor;
mod audit;
mod clock;
mod config;
mod engine;
mod error;
pub mod gateway;
mod scheduler;
mod session;

pub use actor::{ActorContext, Role};
pub use audit::{AuditAction, AuditEntry, AuditError, AuditLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, MAX_EVENT_CAPACITY, MAX_OFFER_WINDOW_DAYS, MAX_POLL_INTERVAL_SECS};
pub use engine::{
    Command, CommandOutcome, Receipt, RefreshOutcome, RegistryEngine, ViewEvent, SYSTEM_ACTOR,
};
pub use error::{EngineError, ErrorKind};
pub use gateway::{LedgerError, LedgerGateway, MemoryLedger, TxResult};
pub use scheduler::{RefreshScheduler, SchedulerHandle};
pub use session::ViewSession;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
