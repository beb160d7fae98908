use chrono::Duration as Days;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use whare_engine::{
    AuditAction, Command, EngineConfig, EngineError, LedgerError, MemoryLedger, ViewEvent,
    SYSTEM_ACTOR,
};
use whare_offers::OfferStatus;
use whare_registry::{Did, PropertyStatus};
use whare_test_utils::{chp, engine_with, h1235, offer_engine, pid, A1};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn offer_h1235() -> Command {
    Command::CreateOffer {
        property_id: pid("#H1235"),
        applicant: Did::new(A1),
        notes: Some("Viewing on Saturday".into()),
    }
}

#[tokio::test(start_paused = true)]
async fn opening_a_view_refreshes_immediately() {
    let (engine, ledger, _clock) = offer_engine();
    assert!(!engine.has_ledger_view());

    let session = engine.open_view();
    settle().await;

    assert!(session.is_active());
    assert!(engine.has_ledger_view());
    assert_eq!(ledger.read_count(), 1);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn refreshes_on_every_interval() {
    let ledger = Arc::new(MemoryLedger::with_properties([h1235()]));
    let config = EngineConfig::new().with_poll_interval_secs(30);
    let (engine, _clock) = engine_with(config, Arc::clone(&ledger));

    let session = engine.open_view();
    settle().await;
    assert_eq!(ledger.read_count(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(ledger.read_count(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(ledger.read_count(), 4);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn navigation_refreshes_without_waiting() {
    let (engine, ledger, _clock) = offer_engine();
    let session = engine.open_view();
    settle().await;

    session.navigate();
    settle().await;
    assert_eq!(ledger.read_count(), 2);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn navigation_keeps_the_interval_schedule() {
    let (engine, ledger, _clock) = offer_engine();
    let session = engine.open_view();
    settle().await;

    tokio::time::sleep(Duration::from_secs(20)).await;
    session.navigate();
    settle().await;
    assert_eq!(ledger.read_count(), 2);

    // Scheduled tick at 30 s still fires
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(ledger.read_count(), 3);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn closing_stops_refreshes() {
    let (engine, ledger, _clock) = offer_engine();
    let session = engine.open_view();
    settle().await;
    session.close().await;

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(ledger.read_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_session_stops_refreshes() {
    let (engine, ledger, _clock) = offer_engine();
    drop(engine.open_view());
    settle().await;

    let reads = ledger.read_count();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(ledger.read_count(), reads);
}

#[tokio::test(start_paused = true)]
async fn closing_discards_pending_command() {
    let (engine, ledger, _clock) = offer_engine();
    let session = engine.open_view();
    settle().await;

    let _gate = ledger.hold_next_write();
    let task = tokio::spawn(session.dispatch(chp(), offer_h1235()));
    while engine.in_flight() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        engine.property(&pid("H1235")).unwrap().status,
        PropertyStatus::offered_to(Did::new(A1))
    );

    session.close().await;
    assert_eq!(task.await.unwrap(), Err(EngineError::ViewClosed));

    assert_eq!(engine.property(&pid("H1235")).unwrap().status, PropertyStatus::Available);
    assert_eq!(engine.in_flight(), 0);
    assert!(engine.offers().is_empty());
    assert!(engine.audit_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn commands_after_close_fail() {
    let (engine, _ledger, _clock) = offer_engine();
    let session = engine.open_view();
    let pending = session.dispatch(chp(), offer_h1235());
    session.close().await;
    assert_eq!(pending.await, Err(EngineError::ViewClosed));
}

#[tokio::test(start_paused = true)]
async fn scheduler_expires_overdue_offers() {
    let (engine, ledger, clock) = offer_engine();
    let session = engine.open_view();
    settle().await;

    session.dispatch(chp(), offer_h1235()).await.unwrap();
    clock.advance(Days::days(8));
    session.navigate();
    settle().await;

    assert_eq!(engine.offers()[0].status, OfferStatus::Expired);
    assert_eq!(ledger.offers()[0].status, OfferStatus::Expired);
    assert_eq!(engine.property(&pid("H1235")).unwrap().status, PropertyStatus::Available);

    let last = engine.audit_log().entries().pop().unwrap();
    assert!(matches!(last.action, AuditAction::OfferExpired { .. }));
    assert_eq!(last.performed_by, Did::new(SYSTEM_ACTOR));
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_scheduled_read_emits_degraded() {
    let (engine, ledger, _clock) = offer_engine();
    let mut events = engine.subscribe();
    let session = engine.open_view();
    settle().await;
    assert!(matches!(events.recv().await.unwrap(), ViewEvent::Refreshed { seq: 1, .. }));

    ledger.fail_reads(Some(LedgerError::Timeout));
    session.navigate();
    settle().await;

    assert!(matches!(events.recv().await.unwrap(), ViewEvent::Degraded { .. }));
    assert!(engine.has_ledger_view());
    assert!(session.is_active());
    session.close().await;
}
