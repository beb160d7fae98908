//! WhareChain Offers
//!
//! The offer lifecycle: a CHP offers an available property to a waitlisted
//! applicant, who accepts or declines within the response window.
//!
//! # Core Concepts
//!
//! - [`transition`]: structural state machine over property status
//! - [`OfferBook`]: offers of the session and the data guards
//! - [`Waitlist`]: applicants in strict position order
//!
//! All operations take `now` explicitly; nothing here reads the clock.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod book;
mod error;
mod lifecycle;
mod offer;
mod waitlist;

pub use book::OfferBook;
pub use error::{Guard, LifecycleError};
pub use lifecycle::{allowed_events, target_state, transition, LifecycleEvent, LifecycleState};
pub use offer::{Offer, OfferStatus, DEFAULT_RESPONSE_WINDOW_DAYS};
pub use waitlist::{builtin_waitlist, Applicant, HousingNeed, Waitlist};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
