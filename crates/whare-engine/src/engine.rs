//! Registry engine
//!
//! Owns the merged view, the offer book and the waitlist for one dashboard
//! session, and is the only path by which presentation code changes them.
//!
//! A command runs in three steps:
//!
//! 1. `prepare`: under the state lock, check the single-writer claim, run
//!    the lifecycle guards, claim, and apply the optimistic overlay
//! 2. submit the write to the ledger with no lock held
//! 3. `resolve`: confirm the overlay, or roll it back on failure or
//!    cancellation
//!
//! Refreshes read the ledger with no lock held and install the result only
//! if no newer refresh has been installed meanwhile. A failed read installs
//! nothing.

use crate::actor::ActorContext;
use crate::audit::{AuditAction, AuditLog};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gateway::{LedgerError, LedgerGateway, TxResult};
use crate::session::ViewSession;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use whare_offers::{builtin_waitlist, Applicant, Offer, OfferBook, OfferStatus, Waitlist};
use whare_registry::{
    search, Did, InFlightClaims, Mutation, MutationId, MutationKind, OptimisticView, Property,
    PropertyId, PropertyRecord, RebaseReport, Reconciler, RegistryError,
};

/// Identity recorded for scheduler-driven expiries
pub const SYSTEM_ACTOR: &str = "system";

/// Presentation-layer command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a property (CHP)
    AddProperty(PropertyRecord),
    /// Offer a property to a waitlisted applicant (CHP)
    CreateOffer {
        /// Property to offer
        property_id: PropertyId,
        /// Waitlisted applicant
        applicant: Did,
        /// Optional notes for the applicant
        notes: Option<String>,
    },
    /// Accept the pending offer (offeree)
    AcceptOffer {
        /// Offered property
        property_id: PropertyId,
    },
    /// Decline the pending offer (offeree)
    DeclineOffer {
        /// Offered property
        property_id: PropertyId,
        /// Non-empty reason
        reason: String,
    },
    /// Expire an overdue offer (CHP or scheduler)
    ExpireOffer {
        /// Offered property
        property_id: PropertyId,
    },
}

impl Command {
    fn action(&self) -> &'static str {
        match self {
            Self::AddProperty(_) => "add properties",
            Self::CreateOffer { .. } => "create offers",
            Self::AcceptOffer { .. } => "accept offers",
            Self::DeclineOffer { .. } => "decline offers",
            Self::ExpireOffer { .. } => "expire offers",
        }
    }

    fn requires_provider(&self) -> bool {
        matches!(
            self,
            Self::AddProperty(_) | Self::CreateOffer { .. } | Self::ExpireOffer { .. }
        )
    }
}

/// Confirmed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Overlay that carried the change
    pub mutation: MutationId,
    /// Ledger transaction hash
    pub tx_hash: String,
    /// Offer as recorded, for offer commands
    pub offer: Option<Offer>,
}

/// Result of a dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Written to the ledger
    Confirmed(Receipt),
    /// Nothing to do (offer already expired)
    NoOp,
}

/// Result of an installed or discarded refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New base view installed
    Applied {
        /// Refresh sequence number
        seq: u64,
        /// What happened to live overlays
        report: RebaseReport,
    },
    /// A newer refresh was installed first; result discarded
    Stale {
        /// Refresh sequence number
        seq: u64,
    },
}

/// Change notification for subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// Ledger read installed
    Refreshed {
        /// Refresh sequence number
        seq: u64,
        /// Properties in the view
        properties: usize,
    },
    /// Ledger read failed
    Degraded {
        /// Failure reason
        reason: String,
    },
    /// Optimistic change visible
    Optimistic {
        /// Overlay id
        mutation: MutationId,
        /// Mutation kind
        kind: MutationKind,
        /// Target property
        property: PropertyId,
    },
    /// Ledger confirmed a change
    Confirmed {
        /// Overlay id
        mutation: MutationId,
        /// Transaction hash
        tx_hash: String,
    },
    /// Ledger rejected a change; the overlay is gone
    RolledBack {
        /// Overlay id
        mutation: MutationId,
        /// Ledger reason
        reason: String,
    },
}

#[derive(Debug)]
struct EngineState {
    layer: OptimisticView,
    book: OfferBook,
    waitlist: Waitlist,
    ledger_backed: bool,
    applied_seq: u64,
}

#[derive(Debug)]
enum Write {
    AddProperty(PropertyRecord),
    CreateOffer(Offer),
    Outcome(Offer),
}

/// How to restore the offer book if the write does not land
#[derive(Debug)]
enum Undo {
    Nothing,
    RemoveOffer(Offer),
    RestoreOffer(Offer),
}

impl Undo {
    fn apply(self, book: &mut OfferBook) {
        match self {
            Self::Nothing => {}
            Self::RemoveOffer(offer) => {
                book.remove(&offer);
            }
            Self::RestoreOffer(offer) => book.upsert(offer),
        }
    }
}

#[derive(Debug)]
struct Staged {
    id: MutationId,
    mutation: Mutation,
    write: Write,
    undo: Undo,
    audit: AuditAction,
}

/// Registry engine, shared as `Arc<RegistryEngine>`
pub struct RegistryEngine {
    config: EngineConfig,
    gateway: Arc<dyn LedgerGateway>,
    clock: Arc<dyn Clock>,
    reconciler: Reconciler,
    state: Mutex<EngineState>,
    claims: InFlightClaims,
    audit: AuditLog,
    events: broadcast::Sender<ViewEvent>,
    refresh_seq: AtomicU64,
}

impl std::fmt::Debug for RegistryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEngine")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("in_flight", &self.claims.len())
            .field("audit_entries", &self.audit.len())
            .finish_non_exhaustive()
    }
}

impl RegistryEngine {
    /// Create an engine showing the fallback catalog until the first refresh
    ///
    /// # Errors
    /// - `EngineError::Config` for invalid configuration or an unreadable catalog file
    /// - `EngineError::Registry` for an invalid catalog record
    pub fn new(config: EngineConfig, gateway: Arc<dyn LedgerGateway>) -> Result<Self, EngineError> {
        config.validate()?;
        let reconciler = Reconciler::new(config.load_fallback()?);
        let (events, _) = broadcast::channel(config.event_capacity);
        let state = EngineState {
            layer: OptimisticView::new(reconciler.fallback().to_vec()),
            book: OfferBook::with_window(config.offer_window()),
            waitlist: builtin_waitlist(),
            ledger_backed: false,
            applied_seq: 0,
        };
        Ok(Self {
            config,
            gateway,
            clock: Arc::new(SystemClock),
            reconciler,
            state: Mutex::new(state),
            claims: InFlightClaims::new(),
            audit: AuditLog::new(),
            events,
            refresh_seq: AtomicU64::new(0),
        })
    }

    /// With a clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With a waitlist replacing the built-in one
    #[must_use]
    pub fn with_waitlist(mut self, waitlist: Waitlist) -> Self {
        self.state.get_mut().waitlist = waitlist;
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current merged view, overlays included
    #[must_use]
    pub fn merged_view(&self) -> Vec<Property> {
        self.state.lock().layer.view().to_vec()
    }

    /// Look up one property in the merged view
    #[must_use]
    pub fn property(&self, id: &PropertyId) -> Option<Property> {
        self.state.lock().layer.view().iter().find(|p| &p.id == id).cloned()
    }

    /// Search the merged view
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<Property> {
        let state = self.state.lock();
        search(state.layer.view(), term, &self.config.id_prefix)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Check if the view has ever been backed by a ledger read
    #[must_use]
    pub fn has_ledger_view(&self) -> bool {
        self.state.lock().ledger_backed
    }

    /// Waitlist snapshot
    #[must_use]
    pub fn waitlist(&self) -> Waitlist {
        self.state.lock().waitlist.clone()
    }

    /// Lowest-position applicant without a pending offer
    #[must_use]
    pub fn next_eligible(&self) -> Option<Applicant> {
        let state = self.state.lock();
        state.waitlist.next_eligible(&state.book).cloned()
    }

    /// Offer history snapshot
    #[must_use]
    pub fn offers(&self) -> Vec<Offer> {
        self.state.lock().book.history().to_vec()
    }

    /// Audit trail of confirmed writes
    #[inline]
    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Number of mutations awaiting the ledger
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.claims.len()
    }

    /// Receive view change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// Open a view session; its scheduler refreshes immediately
    #[must_use]
    pub fn open_view(self: &Arc<Self>) -> ViewSession {
        ViewSession::open(Arc::clone(self))
    }

    /// Run a command on behalf of an actor
    ///
    /// # Errors
    /// - `EngineError::Unauthorized` when the role may not issue the command
    /// - lifecycle, registry and ledger errors as described on [`EngineError`]
    pub async fn dispatch(
        &self,
        ctx: &ActorContext,
        command: Command,
    ) -> Result<CommandOutcome, EngineError> {
        self.dispatch_within(ctx, command, &CancellationToken::new()).await
    }

    /// Run a command whose result is discarded once `cancel` fires
    ///
    /// # Errors
    /// As [`RegistryEngine::dispatch`], plus `EngineError::ViewClosed` on cancellation
    pub async fn dispatch_within(
        &self,
        ctx: &ActorContext,
        command: Command,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, EngineError> {
        if command.requires_provider() && !ctx.role.is_provider() {
            return Err(EngineError::Unauthorized {
                actor: ctx.actor.clone(),
                role: ctx.role,
                action: command.action(),
            });
        }
        self.execute(&ctx.actor, command, cancel).await
    }

    /// Read the ledger and install the reconciled view
    ///
    /// # Errors
    /// - `EngineError::Registry(SourceUnavailable)` when the read failed; the
    ///   current view stays, confirmed overlays included
    /// - `EngineError::ViewClosed` when `cancel` fired first
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshOutcome, EngineError> {
        let seq = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, "refresh started");

        let (properties, offers) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(EngineError::ViewClosed),
            read = futures::future::join(
                self.gateway.read_all_properties(),
                self.gateway.read_offer_history(),
            ) => read,
        };
        if cancel.is_cancelled() {
            return Err(EngineError::ViewClosed);
        }

        self.install(seq, properties.and_then(|p| offers.map(|o| (p, o))))
    }

    /// Expire every pending offer past its deadline
    pub async fn expire_overdue(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<Result<CommandOutcome, EngineError>> {
        let due = self.state.lock().book.due_for_expiry(self.clock.now());
        let system = Did::new(SYSTEM_ACTOR);
        let mut results = Vec::with_capacity(due.len());
        for offer in due {
            let property_id = offer.property_id;
            let result = self
                .execute(&system, Command::ExpireOffer { property_id: property_id.clone() }, cancel)
                .await;
            if let Err(e) = &result {
                warn!(property = %property_id, error = %e, "offer expiry failed");
            }
            results.push(result);
        }
        results
    }

    fn install(
        &self,
        seq: u64,
        read: Result<(Vec<PropertyRecord>, Vec<Offer>), LedgerError>,
    ) -> Result<RefreshOutcome, EngineError> {
        let mut state = self.state.lock();
        if seq <= state.applied_seq {
            debug!(seq, applied = state.applied_seq, "discarding stale refresh");
            return Ok(RefreshOutcome::Stale { seq });
        }

        match read {
            // The view is already the last installed base plus live overlays
            Err(e) => {
                drop(state);
                let reason = e.to_string();
                warn!(seq, %reason, "ledger read failed, keeping current view");
                self.emit(ViewEvent::Degraded { reason: reason.clone() });
                Err(RegistryError::SourceUnavailable { reason }.into())
            }
            Ok((records, offers)) => {
                let ledger: Vec<Property> = records
                    .into_iter()
                    .filter_map(|record| match Property::try_from(record) {
                        Ok(p) => Some(p),
                        Err(e) => {
                            warn!(error = %e, "dropping invalid ledger record");
                            None
                        }
                    })
                    .collect();
                let reconciled = self.reconciler.reconcile(Ok::<_, LedgerError>(ledger));
                let report = state.layer.rebase(reconciled.properties);
                state.applied_seq = seq;
                state.ledger_backed = true;
                state.book.reconcile(offers, &self.claims.claimed_properties());

                let properties = state.layer.view().len();
                drop(state);
                info!(
                    seq,
                    properties,
                    superseded = report.superseded,
                    reapplied = report.reapplied,
                    "view refreshed"
                );
                self.emit(ViewEvent::Refreshed { seq, properties });
                Ok(RefreshOutcome::Applied { seq, report })
            }
        }
    }

    async fn execute(
        &self,
        actor: &Did,
        command: Command,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::ViewClosed);
        }
        let Some(staged) = self.prepare(actor, command)? else {
            return Ok(CommandOutcome::NoOp);
        };

        let tx = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            tx = self.submit(&staged.write) => Some(tx),
        };
        self.resolve(actor, staged, tx)
    }

    async fn submit(&self, write: &Write) -> TxResult {
        match write {
            Write::AddProperty(record) => self.gateway.submit_add_property(record).await,
            Write::CreateOffer(offer) => self.gateway.submit_create_offer(offer).await,
            Write::Outcome(offer) => self.gateway.submit_offer_outcome(offer).await,
        }
    }

    fn prepare(&self, actor: &Did, command: Command) -> Result<Option<Staged>, EngineError> {
        let now = self.clock.now();
        let id = MutationId::new();
        let mut state = self.state.lock();

        let staged = match command {
            Command::AddProperty(record) => {
                let property = Property::try_from(record.clone())?;
                if state.layer.view().iter().any(|p| p.id == property.id) {
                    return Err(RegistryError::invalid(format!(
                        "{} is already registered",
                        property.id
                    ))
                    .into());
                }
                Staged {
                    id,
                    audit: AuditAction::PropertyAdded {
                        property: property.id.clone(),
                    },
                    mutation: Mutation::AddProperty(property),
                    write: Write::AddProperty(record),
                    undo: Undo::Nothing,
                }
            }
            Command::CreateOffer {
                property_id,
                applicant,
                notes,
            } => {
                self.ensure_unclaimed(MutationKind::MarkOffered, &property_id)?;
                if !state.waitlist.contains(&applicant) {
                    return Err(EngineError::UnknownApplicant(applicant));
                }
                let property = find(&state.layer, &property_id)?;
                let mut offer = state.book.create_offer(&property, applicant.clone(), now)?;
                if let Some(notes) = notes {
                    offer = offer.with_notes(notes);
                    state.book.upsert(offer.clone());
                }
                Staged {
                    id,
                    mutation: Mutation::MarkOffered {
                        property_id: property_id.clone(),
                        applicant: applicant.clone(),
                    },
                    write: Write::CreateOffer(offer.clone()),
                    undo: Undo::RemoveOffer(offer),
                    audit: AuditAction::OfferCreated {
                        property: property_id,
                        applicant,
                    },
                }
            }
            Command::AcceptOffer { property_id } => {
                self.ensure_unclaimed(MutationKind::MarkOccupied, &property_id)?;
                let property = find(&state.layer, &property_id)?;
                let prior = state.book.pending_for_property(&property_id).cloned();
                let accepted = state.book.accept(&property, actor, now)?;
                Staged {
                    id,
                    mutation: Mutation::MarkOccupied {
                        property_id: property_id.clone(),
                        occupant: accepted.applicant_did.clone(),
                        move_in: Some(now.date_naive()),
                    },
                    audit: AuditAction::OfferAccepted {
                        property: property_id,
                        applicant: accepted.applicant_did.clone(),
                    },
                    write: Write::Outcome(accepted),
                    undo: prior.map_or(Undo::Nothing, Undo::RestoreOffer),
                }
            }
            Command::DeclineOffer { property_id, reason } => {
                self.ensure_unclaimed(MutationKind::MarkAvailable, &property_id)?;
                let property = find(&state.layer, &property_id)?;
                let prior = state.book.pending_for_property(&property_id).cloned();
                let declined = state.book.decline(&property, actor, &reason, now)?;
                Staged {
                    id,
                    mutation: Mutation::MarkAvailable {
                        property_id: property_id.clone(),
                    },
                    audit: AuditAction::OfferDeclined {
                        property: property_id,
                        applicant: declined.applicant_did.clone(),
                        reason: declined.decline_reason.clone().unwrap_or_default(),
                    },
                    write: Write::Outcome(declined),
                    undo: prior.map_or(Undo::Nothing, Undo::RestoreOffer),
                }
            }
            Command::ExpireOffer { property_id } => {
                self.ensure_unclaimed(MutationKind::MarkAvailable, &property_id)?;
                let property = find(&state.layer, &property_id)?;
                let prior = state.book.pending_for_property(&property_id).cloned();
                let Some(expired) = state.book.expire(&property, now)? else {
                    return Ok(None);
                };
                Staged {
                    id,
                    mutation: Mutation::MarkAvailable {
                        property_id: property_id.clone(),
                    },
                    audit: AuditAction::OfferExpired {
                        property: property_id,
                        applicant: expired.applicant_did.clone(),
                    },
                    write: Write::Outcome(expired),
                    undo: prior.map_or(Undo::Nothing, Undo::RestoreOffer),
                }
            }
        };

        if let Err(e) = self.claims.claim(&staged.mutation, staged.id) {
            staged.undo.apply(&mut state.book);
            return Err(e.into());
        }
        if let Err(e) = state.layer.apply(staged.id, staged.mutation.clone()) {
            self.claims.release(&staged.mutation, staged.id);
            staged.undo.apply(&mut state.book);
            return Err(e.into());
        }
        drop(state);

        info!(
            mutation = %staged.id,
            kind = %staged.mutation.kind(),
            property = %staged.mutation.target(),
            "optimistic change applied"
        );
        self.emit(ViewEvent::Optimistic {
            mutation: staged.id,
            kind: staged.mutation.kind(),
            property: staged.mutation.target().clone(),
        });
        Ok(Some(staged))
    }

    fn resolve(
        &self,
        actor: &Did,
        staged: Staged,
        tx: Option<TxResult>,
    ) -> Result<CommandOutcome, EngineError> {
        let Staged {
            id,
            mutation,
            write,
            undo,
            audit,
        } = staged;
        let mut state = self.state.lock();
        self.claims.release(&mutation, id);

        match tx {
            None => {
                state.layer.rollback(id);
                undo.apply(&mut state.book);
                debug!(mutation = %id, "view closed, write result discarded");
                Err(EngineError::ViewClosed)
            }
            Some(TxResult::Failed(reason)) => {
                state.layer.rollback(id);
                undo.apply(&mut state.book);
                drop(state);
                warn!(
                    mutation = %id,
                    kind = %mutation.kind(),
                    %reason,
                    "ledger rejected write, rolled back"
                );
                self.emit(ViewEvent::RolledBack {
                    mutation: id,
                    reason: reason.clone(),
                });
                Err(EngineError::WriteRejected { reason })
            }
            Some(TxResult::Confirmed { tx_hash }) => {
                state.layer.confirm(id);
                let offer = match write {
                    Write::AddProperty(_) => None,
                    Write::CreateOffer(offer) => Some(offer),
                    Write::Outcome(offer) => {
                        if offer.status == OfferStatus::Accepted
                            && state.waitlist.remove(&offer.applicant_did).is_some()
                        {
                            info!(
                                applicant = %offer.applicant_did,
                                "applicant housed, removed from waitlist"
                            );
                        }
                        Some(offer)
                    }
                };
                drop(state);

                self.audit.append(self.clock.now(), tx_hash.clone(), audit, actor.clone());
                info!(mutation = %id, kind = %mutation.kind(), %tx_hash, "write confirmed");
                self.emit(ViewEvent::Confirmed {
                    mutation: id,
                    tx_hash: tx_hash.clone(),
                });
                Ok(CommandOutcome::Confirmed(Receipt {
                    mutation: id,
                    tx_hash,
                    offer,
                }))
            }
        }
    }

    fn ensure_unclaimed(
        &self,
        kind: MutationKind,
        property: &PropertyId,
    ) -> Result<(), EngineError> {
        if self.claims.is_claimed(kind, property) {
            return Err(RegistryError::ConflictingMutation {
                kind,
                property: property.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn emit(&self, event: ViewEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn find(layer: &OptimisticView, id: &PropertyId) -> Result<Property, RegistryError> {
    layer
        .view()
        .iter()
        .find(|p| &p.id == id)
        .cloned()
        .ok_or_else(|| RegistryError::UnknownProperty(id.clone()))
}
