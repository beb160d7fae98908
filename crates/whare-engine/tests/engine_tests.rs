use chrono::Duration;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use whare_engine::{
    Command, CommandOutcome, EngineConfig, EngineError, ErrorKind, LedgerError, MemoryLedger,
    RefreshOutcome, RegistryEngine, ViewEvent,
};
use whare_offers::OfferStatus;
use whare_registry::{Did, PropertyStatus, Provenance, RegistryError, StatusKind};
use whare_test_utils::{applicant, chp, engine_with, h1202, h1235, offer_engine, pid, t0, A1, A2};

async fn until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn offer_h1235(to: &str) -> Command {
    Command::CreateOffer {
        property_id: pid("#H1235"),
        applicant: Did::new(to),
        notes: None,
    }
}

fn status_of(engine: &RegistryEngine, id: &str) -> PropertyStatus {
    engine.property(&pid(id)).unwrap().status
}

#[tokio::test]
async fn fallback_view_until_ledger_holds_the_property() {
    let mut catalog = tempfile::NamedTempFile::new().unwrap();
    let records = vec![h1202(PropertyStatus::Available).to_record()];
    write!(catalog, "{}", serde_json::to_string(&records).unwrap()).unwrap();

    let ledger = Arc::new(MemoryLedger::new());
    let config = EngineConfig::new().with_fallback_catalog(catalog.path());
    let (engine, _clock) = engine_with(config, Arc::clone(&ledger));
    let cancel = CancellationToken::new();

    engine.refresh(&cancel).await.unwrap();
    assert_eq!(engine.merged_view(), vec![h1202(PropertyStatus::Available)]);

    ledger.put_property(h1202(PropertyStatus::occupied_by(Did::new("[0x...A3B1]"))).to_record());
    engine.refresh(&cancel).await.unwrap();

    let view = engine.merged_view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].display_id("#"), "#H1202");
    assert_eq!(view[0].status_kind(), StatusKind::Occupied);
    assert_eq!(view[0].provenance, Provenance::Ledger);
}

#[tokio::test]
async fn offer_then_decline_returns_property_to_available() {
    let (engine, ledger, clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();

    engine.dispatch(&chp(), offer_h1235(A1)).await.unwrap();
    assert_eq!(status_of(&engine, "#H1235"), PropertyStatus::offered_to(Did::new(A1)));

    clock.advance(Duration::days(2));
    let outcome = engine
        .dispatch(
            &applicant(A1),
            Command::DeclineOffer {
                property_id: pid("#H1235"),
                reason: "too far from work".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(status_of(&engine, "#H1235"), PropertyStatus::Available);
    let CommandOutcome::Confirmed(receipt) = outcome else {
        panic!("expected a confirmed write");
    };
    let offer = receipt.offer.unwrap();
    assert_eq!(offer.status, OfferStatus::Declined);
    assert_eq!(offer.decline_reason.as_deref(), Some("too far from work"));
    assert_eq!(offer.responded_at, Some(t0() + Duration::days(2)));

    // Declining keeps the applicant waitlisted
    assert!(engine.waitlist().contains(&Did::new(A1)));
    assert_eq!(ledger.offers()[0].status, OfferStatus::Declined);

    let audit = engine.audit_log();
    assert_eq!(audit.len(), 2);
    assert!(audit.verify_integrity().is_ok());
    assert_eq!(audit.entries()[1].performed_by, Did::new(A1));
}

#[tokio::test]
async fn accept_houses_applicant() {
    let (engine, _ledger, clock) = offer_engine();
    let cancel = CancellationToken::new();
    engine.refresh(&cancel).await.unwrap();

    engine.dispatch(&chp(), offer_h1235(A1)).await.unwrap();
    clock.advance(Duration::days(3));
    engine
        .dispatch(&applicant(A1), Command::AcceptOffer { property_id: pid("#H1235") })
        .await
        .unwrap();

    let housed = engine.property(&pid("H1235")).unwrap();
    assert_eq!(housed.occupant(), Some(&Did::new(A1)));
    assert_eq!(housed.move_in_date, Some((t0() + Duration::days(3)).date_naive()));
    assert!(!engine.waitlist().contains(&Did::new(A1)));
    assert_eq!(engine.next_eligible().unwrap().did, Did::new(A2));

    // Ledger truth agrees after the next refresh
    engine.refresh(&cancel).await.unwrap();
    assert_eq!(engine.property(&pid("H1235")).unwrap(), housed);
}

#[tokio::test]
async fn applicants_cannot_create_offers() {
    let (engine, _ledger, _clock) = offer_engine();
    let err = engine.dispatch(&applicant(A1), offer_h1235(A1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(engine.offers().is_empty());
}

#[tokio::test]
async fn offers_go_to_waitlisted_applicants_only() {
    let (engine, _ledger, _clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();
    let err = engine.dispatch(&chp(), offer_h1235("stranger")).await.unwrap_err();
    assert_eq!(err, EngineError::UnknownApplicant(Did::new("stranger")));
}

#[tokio::test]
async fn only_offeree_may_respond() {
    let (engine, _ledger, _clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();
    engine.dispatch(&chp(), offer_h1235(A1)).await.unwrap();

    let err = engine
        .dispatch(&applicant(A2), Command::AcceptOffer { property_id: pid("H1235") })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(status_of(&engine, "H1235"), PropertyStatus::offered_to(Did::new(A1)));
}

#[tokio::test]
async fn rejected_write_rolls_back() {
    let (engine, ledger, _clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();
    let before = engine.merged_view();
    let mut events = engine.subscribe();

    ledger.reject_next_write("out of gas");
    let err = engine.dispatch(&chp(), offer_h1235(A1)).await.unwrap_err();
    assert_eq!(err, EngineError::WriteRejected { reason: "out of gas".into() });
    assert!(err.is_retryable());

    assert_eq!(engine.merged_view(), before);
    assert!(engine.offers().is_empty());
    assert_eq!(engine.in_flight(), 0);
    assert!(engine.audit_log().is_empty());

    assert!(matches!(events.recv().await.unwrap(), ViewEvent::Optimistic { .. }));
    assert!(matches!(events.recv().await.unwrap(), ViewEvent::RolledBack { .. }));

    // Retry succeeds
    engine.dispatch(&chp(), offer_h1235(A1)).await.unwrap();
}

#[tokio::test]
async fn optimistic_change_visible_before_confirmation() {
    let (engine, ledger, _clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();

    let gate = ledger.hold_next_write();
    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.dispatch(&chp(), offer_h1235(A1)).await }
    });
    until(|| engine.in_flight() == 1).await;

    assert_eq!(status_of(&engine, "H1235"), PropertyStatus::offered_to(Did::new(A1)));
    assert_eq!(ledger.properties()[0].status, StatusKind::Available);

    gate.send(()).unwrap();
    assert!(matches!(task.await.unwrap().unwrap(), CommandOutcome::Confirmed(_)));
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn concurrent_offers_on_one_property_conflict() {
    let (engine, ledger, _clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();

    let gate = ledger.hold_next_write();
    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.dispatch(&chp(), offer_h1235(A1)).await }
    });
    until(|| engine.in_flight() == 1).await;

    let err = engine.dispatch(&chp(), offer_h1235(A2)).await.unwrap_err();
    assert!(matches!(err, EngineError::Registry(RegistryError::ConflictingMutation { .. })));

    gate.send(()).unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(status_of(&engine, "H1235"), PropertyStatus::offered_to(Did::new(A1)));
}

#[tokio::test]
async fn in_flight_overlay_survives_refresh() {
    let (engine, ledger, _clock) = offer_engine();
    let cancel = CancellationToken::new();
    engine.refresh(&cancel).await.unwrap();

    let gate = ledger.hold_next_write();
    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.dispatch(&chp(), offer_h1235(A1)).await }
    });
    until(|| engine.in_flight() == 1).await;

    let RefreshOutcome::Applied { report, .. } = engine.refresh(&cancel).await.unwrap() else {
        panic!("refresh should apply");
    };
    assert_eq!(report.reapplied, 1);
    assert_eq!(status_of(&engine, "H1235"), PropertyStatus::offered_to(Did::new(A1)));
    assert_eq!(engine.offers().len(), 1);

    gate.send(()).unwrap();
    task.await.unwrap().unwrap();

    let RefreshOutcome::Applied { report, .. } = engine.refresh(&cancel).await.unwrap() else {
        panic!("refresh should apply");
    };
    assert_eq!(report.confirmed_dropped, 1);
    assert_eq!(status_of(&engine, "H1235"), PropertyStatus::offered_to(Did::new(A1)));
}

#[tokio::test]
async fn late_accept_fails_and_expiry_is_idempotent() {
    let (engine, _ledger, clock) = offer_engine();
    let cancel = CancellationToken::new();
    engine.refresh(&cancel).await.unwrap();
    engine.dispatch(&chp(), offer_h1235(A1)).await.unwrap();

    clock.advance(Duration::days(7));
    let err = engine
        .dispatch(&applicant(A1), Command::AcceptOffer { property_id: pid("H1235") })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OfferExpired);
    assert_eq!(status_of(&engine, "H1235"), PropertyStatus::offered_to(Did::new(A1)));

    let swept = engine.expire_overdue(&cancel).await;
    assert_eq!(swept.len(), 1);
    assert!(swept[0].is_ok());
    assert_eq!(status_of(&engine, "H1235"), PropertyStatus::Available);
    assert_eq!(engine.offers()[0].status, OfferStatus::Expired);

    let again = engine
        .dispatch(&chp(), Command::ExpireOffer { property_id: pid("H1235") })
        .await
        .unwrap();
    assert_eq!(again, CommandOutcome::NoOp);
    assert!(engine.expire_overdue(&cancel).await.is_empty());
}

#[tokio::test]
async fn failed_first_read_serves_fallback() {
    let (engine, ledger, _clock) = offer_engine();
    let fallback = engine.merged_view();
    let cancel = CancellationToken::new();

    ledger.fail_reads(Some(LedgerError::Timeout));
    let err = engine.refresh(&cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    assert_eq!(engine.merged_view(), fallback);
    assert!(!engine.has_ledger_view());

    ledger.fail_reads(None);
    engine.refresh(&cancel).await.unwrap();
    let backed = engine.merged_view();
    assert!(engine.has_ledger_view());

    // A later failure keeps the ledger-backed view
    ledger.fail_reads(Some(LedgerError::Unreachable("node down".into())));
    assert!(engine.refresh(&cancel).await.is_err());
    assert_eq!(engine.merged_view(), backed);
}

#[tokio::test]
async fn stale_refresh_is_discarded() {
    let (engine, ledger, _clock) = offer_engine();
    let gate = ledger.hold_next_read();

    let slow = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.refresh(&CancellationToken::new()).await }
    });
    until(|| ledger.read_count() == 1).await;

    let fast = engine.refresh(&CancellationToken::new()).await.unwrap();
    assert!(matches!(fast, RefreshOutcome::Applied { seq: 2, .. }));

    gate.send(()).unwrap();
    assert_eq!(slow.await.unwrap().unwrap(), RefreshOutcome::Stale { seq: 1 });
}

#[tokio::test]
async fn cancelled_refresh_reports_view_closed() {
    let (engine, ledger, _clock) = offer_engine();
    let _gate = ledger.hold_next_read();
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        async move { engine.refresh(&cancel).await }
    });
    until(|| ledger.read_count() == 1).await;
    cancel.cancel();

    assert_eq!(task.await.unwrap(), Err(EngineError::ViewClosed));
    assert!(!engine.has_ledger_view());
}

#[tokio::test]
async fn add_property_appears_and_is_audited() {
    let (engine, ledger, _clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();

    let record = whare_test_utils::property("#H1300", PropertyStatus::Available).to_record();
    engine.dispatch(&chp(), Command::AddProperty(record.clone())).await.unwrap();

    assert!(engine.property(&pid("H1300")).is_some());
    assert_eq!(ledger.properties().len(), 2);

    let err = engine.dispatch(&chp(), Command::AddProperty(record)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecord);
    assert_eq!(engine.audit_log().len(), 1);
}

#[tokio::test]
async fn search_uses_display_ids() {
    let (engine, _ledger, _clock) = offer_engine();
    engine.refresh(&CancellationToken::new()).await.unwrap();
    let hits = engine.search("#h1235");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, h1235().id);
    assert_eq!(hits[0].provenance, Provenance::Ledger);
}

#[tokio::test]
async fn failed_read_keeps_confirmed_writes() {
    let (engine, ledger, _clock) = offer_engine();
    let cancel = CancellationToken::new();
    ledger.fail_reads(Some(LedgerError::Timeout));
    assert!(engine.refresh(&cancel).await.is_err());

    let record = whare_test_utils::property("#H1300", PropertyStatus::Available).to_record();
    engine.dispatch(&chp(), Command::AddProperty(record)).await.unwrap();
    assert!(engine.property(&pid("H1300")).is_some());

    let err = engine.refresh(&cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    assert!(engine.property(&pid("H1300")).is_some());
    assert!(!engine.has_ledger_view());

    // The next good read carries the write as ledger truth
    ledger.fail_reads(None);
    engine.refresh(&cancel).await.unwrap();
    assert_eq!(
        engine.property(&pid("H1300")).unwrap().provenance,
        Provenance::Ledger
    );
}

#[tokio::test]
async fn failed_read_keeps_view_and_offer_book_aligned() {
    let (engine, ledger, _clock) = offer_engine();
    let cancel = CancellationToken::new();
    ledger.fail_reads(Some(LedgerError::Timeout));
    assert!(engine.refresh(&cancel).await.is_err());

    // Served from the fallback catalog, confirmed by the ledger
    engine.dispatch(&chp(), offer_h1235(A1)).await.unwrap();
    assert!(engine.refresh(&cancel).await.is_err());

    assert_eq!(
        status_of(&engine, "H1235"),
        PropertyStatus::offered_to(Did::new(A1))
    );
    engine
        .dispatch(
            &applicant(A1),
            Command::AcceptOffer {
                property_id: pid("H1235"),
            },
        )
        .await
        .unwrap();
    assert_eq!(status_of(&engine, "H1235").kind(), StatusKind::Occupied);
}

#[tokio::test]
async fn failed_newer_read_does_not_mask_older_success() {
    let (engine, ledger, _clock) = offer_engine();
    let gate = ledger.hold_next_read();

    let slow = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.refresh(&CancellationToken::new()).await }
    });
    until(|| ledger.read_count() == 1).await;

    ledger.fail_reads(Some(LedgerError::Timeout));
    assert!(engine.refresh(&CancellationToken::new()).await.is_err());
    ledger.fail_reads(None);

    gate.send(()).unwrap();
    assert!(matches!(
        slow.await.unwrap().unwrap(),
        RefreshOutcome::Applied { seq: 1, .. }
    ));
    assert!(engine.has_ledger_view());
}

#[tokio::test]
async fn oversized_offer_window_rejected_at_construction() {
    let config = EngineConfig::new().with_offer_window_days(4_000_000_000);
    let err = RegistryEngine::new(config, Arc::new(MemoryLedger::new())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
