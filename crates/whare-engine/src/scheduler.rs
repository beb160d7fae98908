//! Refresh scheduler
//!
//! One background task per view session. It refreshes immediately, then on
//! a fixed-period interval and on every navigation trigger, until
//! cancelled. Each tick also sweeps overdue offers. Failed reads are not
//! retried; the next tick tries again.

use crate::engine::{RefreshOutcome, RegistryEngine};
use crate::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval and navigation-driven refresh loop
#[derive(Debug)]
pub struct RefreshScheduler {
    interval: Duration,
    trigger: Arc<Notify>,
}

impl RefreshScheduler {
    /// Create scheduler
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Start the loop on the current Tokio runtime
    ///
    /// # Panics
    /// Outside a Tokio runtime.
    #[must_use]
    pub fn spawn(
        self,
        engine: Arc<RegistryEngine>,
        cancel: CancellationToken,
    ) -> SchedulerHandle {
        let trigger = Arc::clone(&self.trigger);
        let task = tokio::spawn(run(
            engine,
            self.interval,
            Arc::clone(&self.trigger),
            cancel.clone(),
        ));
        SchedulerHandle { trigger, cancel, task }
    }
}

/// Running scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request an immediate refresh
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Check if the loop has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "refresh scheduler task failed");
        }
    }
}

async fn run(
    engine: Arc<RegistryEngine>,
    interval: Duration,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "refresh scheduler started");
    // First tick completes immediately; navigation does not reset the period
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = trigger.notified() => debug!("navigation refresh"),
            _ = ticker.tick() => {}
        }
        tick(&engine, &cancel).await;
    }
    info!("refresh scheduler stopped");
}

async fn tick(engine: &RegistryEngine, cancel: &CancellationToken) {
    match engine.refresh(cancel).await {
        Ok(RefreshOutcome::Applied { .. }) => {}
        Ok(RefreshOutcome::Stale { seq }) => debug!(seq, "refresh superseded"),
        Err(EngineError::ViewClosed) => return,
        Err(e) => warn!(error = %e, "refresh failed, keeping previous view"),
    }
    let expired = engine.expire_overdue(cancel).await;
    if !expired.is_empty() {
        debug!(count = expired.len(), "overdue offers swept");
    }
}
