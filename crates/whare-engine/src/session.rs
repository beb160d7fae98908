//! View sessions
//!
//! A session is one active dashboard view. While it is open its scheduler
//! keeps the engine fresh; closing or dropping it stops the scheduler and
//! discards the results of any refresh or command still waiting on the
//! ledger.

use crate::actor::ActorContext;
use crate::engine::{Command, CommandOutcome, RefreshOutcome, RegistryEngine};
use crate::error::EngineError;
use crate::scheduler::{RefreshScheduler, SchedulerHandle};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use whare_registry::Property;

/// Active view over the engine
#[derive(Debug)]
#[must_use = "dropping a session closes the view"]
pub struct ViewSession {
    engine: Arc<RegistryEngine>,
    cancel: CancellationToken,
    scheduler: Option<SchedulerHandle>,
}

impl ViewSession {
    /// # Panics
    /// Outside a Tokio runtime.
    pub(crate) fn open(engine: Arc<RegistryEngine>) -> Self {
        let cancel = CancellationToken::new();
        let scheduler = RefreshScheduler::new(engine.config().poll_interval())
            .spawn(Arc::clone(&engine), cancel.clone());
        info!("view opened");
        Self {
            engine,
            cancel,
            scheduler: Some(scheduler),
        }
    }

    /// Engine behind the view
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<RegistryEngine> {
        &self.engine
    }

    /// Current merged view
    #[must_use]
    pub fn view(&self) -> Vec<Property> {
        self.engine.merged_view()
    }

    /// Check if the view is still open
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Navigation or re-activation: refresh now
    pub fn navigate(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.trigger();
        }
    }

    /// Refresh now and wait for the result
    ///
    /// # Errors
    /// As [`RegistryEngine::refresh`]
    pub async fn refresh(&self) -> Result<RefreshOutcome, EngineError> {
        self.engine.refresh(&self.cancel).await
    }

    /// Dispatch a command tied to this view
    ///
    /// The returned future owns its inputs, so it can be spawned; it resolves
    /// to `EngineError::ViewClosed` if the view closes first.
    pub fn dispatch(
        &self,
        ctx: ActorContext,
        command: Command,
    ) -> impl Future<Output = Result<CommandOutcome, EngineError>> + Send + 'static {
        let engine = Arc::clone(&self.engine);
        let cancel = self.cancel.clone();
        async move { engine.dispatch_within(&ctx, command, &cancel).await }
    }

    /// Close the view and wait for the scheduler to stop
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        info!("view closed");
    }
}

impl Drop for ViewSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
