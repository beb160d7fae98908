//! Testing utilities for the WhareChain workspace
//!
//! Shared fixtures: a fixed clock, a two-applicant waitlist, and engines
//! wired to an in-memory ledger.

#![allow(missing_docs)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use whare_engine::{ActorContext, EngineConfig, ManualClock, MemoryLedger, RegistryEngine};
use whare_offers::{Applicant, HousingNeed, Waitlist};
use whare_registry::{Did, Property, PropertyId, PropertyStatus, Provenance};

pub const CHP: &str = "[0x...CHP1]";
pub const A1: &str = "A1";
pub const A2: &str = "A2";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap()
}

pub fn pid(raw: &str) -> PropertyId {
    PropertyId::new(raw).unwrap()
}

pub fn property(id: &str, status: PropertyStatus) -> Property {
    let address = format!("{} Test Street", id.trim_start_matches('#'));
    Property::new(pid(id), address, 2, 1).with_status(status)
}

pub fn h1235() -> Property {
    Property::new(pid("#H1235"), "55 Willis Street, WLG", 3, 1)
        .with_features(["Ground floor", "Close to schools", "Public transport nearby"])
}

pub fn h1202(status: PropertyStatus) -> Property {
    Property::new(pid("#H1202"), "7 Cuba Street, WLG", 2, 1)
        .with_status(status)
        .with_provenance(Provenance::Fallback)
}

pub fn test_waitlist() -> Waitlist {
    Waitlist::new(vec![
        Applicant::new(A1, 1, 90).with_household(3),
        Applicant::new(A2, 2, 80)
            .with_need(HousingNeed::Urgent)
            .with_requirements("Ground floor only"),
    ])
    .unwrap()
}

pub fn chp() -> ActorContext {
    ActorContext::chp(CHP)
}

pub fn applicant(did: &str) -> ActorContext {
    ActorContext::applicant(Did::new(did))
}

/// Engine over `ledger` with a manual clock at [`t0`] and [`test_waitlist`]
pub fn engine_with(
    config: EngineConfig,
    ledger: Arc<MemoryLedger>,
) -> (Arc<RegistryEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = RegistryEngine::new(config, ledger)
        .unwrap()
        .with_clock(clock.clone())
        .with_waitlist(test_waitlist());
    (Arc::new(engine), clock)
}

/// Engine whose ledger holds [`h1235`]
pub fn offer_engine() -> (Arc<RegistryEngine>, Arc<MemoryLedger>, Arc<ManualClock>) {
    let ledger = Arc::new(MemoryLedger::with_properties([h1235()]));
    let (engine, clock) = engine_with(EngineConfig::default(), Arc::clone(&ledger));
    (engine, ledger, clock)
}
