//! WhareChain Registry
//!
//! One consistent view over the housing registry, built from the ledger
//! (authoritative) and a fallback catalog.
//!
//! # Core Concepts
//!
//! - [`Property`]: registry record; its status carries the offer holder or occupant
//! - [`merge`] / [`Reconciler`]: ledger-over-fallback merge policy
//! - [`OptimisticView`]: local overlays applied before ledger confirmation
//! - [`InFlightClaims`]: one in-flight mutation per kind and property
//!
//! # Example
//!
//! ```rust,ignore
//! use whare_registry::{builtin_catalog, Reconciler};
//!
//! let reconciler = Reconciler::new(builtin_catalog());
//! let reconciled = reconciler.reconcile(gateway_read);
//! if let Some(err) = &reconciled.unavailable {
//!     tracing::warn!("showing fallback catalog: {err}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod catalog;
mod error;
mod id;
mod optimistic;
mod property;
mod reconcile;
mod search;

pub use catalog::{builtin_catalog, parse_catalog};
pub use error::RegistryError;
pub use id::{Did, PropertyId, DEFAULT_ID_PREFIX};
pub use optimistic::{
    apply_optimistic, ConflictKey, InFlightClaims, Mutation, MutationId, MutationKind,
    OptimisticView, RebaseReport,
};
pub use property::{
    parse_features, Property, PropertyRecord, PropertyStatus, Provenance, StatusKind,
};
pub use reconcile::{merge, Reconciler, Reconciliation};
pub use search::search;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
