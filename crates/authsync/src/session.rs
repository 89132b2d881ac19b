//! `SessionCore`: the one object UI code talks to.
//!
//! It ties the layers together: prober → reconciler → store → registry.
//! Build it once at startup and hand clones to whoever needs it. There
//! are no globals.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use authsync_authority::{AuthorityClient, AuthorityConfig, HttpAuthority};
use authsync_poll::{PollConfig, PollScheduler};
use authsync_protocol::{AuthSnapshot, ProbeResult, TransitionEvent, TransitionKind};
use authsync_reconcile::{Reconciliation, StoreWrite, SubscriberRegistry, Subscription, reconcile};
use authsync_store::{SessionStore, SnapshotStorage, StorageChange, StoreConfig};
use tokio::sync::{mpsc, watch};

use crate::driver::{CoreDriver, DriverCommand};
use crate::prober::{ProbeTicket, SessionProber};
use crate::{AuthsyncError, CoreConfig};

/// State that must change atomically within one reconciliation pass.
struct CoreState<S> {
    store: SessionStore<S>,
    /// `seq` of the newest probe applied (or fenced off by a logout).
    applied_seq: u64,
}

/// Shared by every clone of a `SessionCore`.
struct Inner<A, S> {
    prober: SessionProber<A>,
    state: Mutex<CoreState<S>>,
    /// Held for a whole pass (reconcile + write + publish) so passes never
    /// interleave. `state` is released before publishing, so handlers may
    /// call `current_snapshot()`.
    pass: Mutex<()>,
    registry: SubscriberRegistry,
    ready: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<DriverCommand>,
}

/// Session reconciliation core for one instance (one "tab").
///
/// Cheap to clone; all clones share state.
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), authsync::AuthsyncError> {
/// use authsync::prelude::*;
///
/// let (core, driver) = SessionCoreBuilder::new()
///     .build_http(AuthorityConfig::with_base_url("https://community.example.com"),
///                 FileStorage::new("/var/lib/authsync"))?;
/// tokio::spawn(driver.run());
///
/// let _nav = core.on_transition(|event| println!("nav bar: {}", event.kind));
/// core.ready().await;
/// println!("logged in as {:?}", core.current_snapshot().map(|s| s.display_name));
/// # Ok(())
/// # }
/// ```
pub struct SessionCore<A, S> {
    inner: Arc<Inner<A, S>>,
}

impl<A, S> Clone for SessionCore<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AuthorityClient, S: SnapshotStorage> SessionCore<A, S> {
    /// Registers a handler for every transition from now on.
    pub fn on_transition<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(handler)
    }

    /// The last-known snapshot (a copy). `None` means logged out or not
    /// yet known.
    pub fn current_snapshot(&self) -> Option<AuthSnapshot> {
        self.lock_state().store.current().cloned()
    }

    /// Probes the authority now and reconciles the result.
    ///
    /// Joins an outstanding probe if there is one. Returns the probe's
    /// result even when it was too old to apply.
    pub async fn force_probe(&self) -> ProbeResult {
        let ticket = self.inner.prober.probe().await;
        self.apply(&ticket);
        ticket.result
    }

    /// Logs out locally, then tells the authority (best-effort).
    ///
    /// The snapshot is cleared and a `Logout` event published before the
    /// network call, and probes already in flight are discarded when they
    /// land, so the UI can't flip back to "logged in" from a stale answer.
    pub async fn logout(&self) {
        {
            let _pass = self.lock_pass();
            let event = {
                let mut state = self.lock_state();
                state.applied_seq = state.applied_seq.max(self.inner.prober.last_issued());
                let previous = state.store.current().cloned();
                state.store.save(None);
                previous.map(|prev| TransitionEvent {
                    kind: TransitionKind::Logout,
                    previous: Some(prev),
                    current: None,
                })
            };
            if let Some(event) = event {
                tracing::info!("logged out locally");
                self.inner.registry.publish(&event);
            }
        }

        if let Err(e) = self.inner.prober.authority().logout().await {
            tracing::warn!(error = %e, "authority logout failed, local state already cleared");
        }
    }

    /// Resolves once the first probe has been reconciled (whatever its
    /// outcome). Resolves immediately after that.
    pub async fn ready(&self) {
        let mut rx = self.inner.ready.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// `true` once [`ready`](Self::ready) would resolve immediately.
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Tells the driver whether this instance is visible. Hidden instances
    /// stop polling; becoming visible resumes polling and, by default,
    /// probes right away.
    pub fn set_visible(&self, visible: bool) {
        self.send(DriverCommand::Visibility(visible));
    }

    /// Stops the driver loop.
    pub fn shutdown(&self) {
        self.send(DriverCommand::Shutdown);
    }

    /// Number of registered transition handlers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    // -- driver hooks -----------------------------------------------------

    pub(crate) fn subscribe_storage(&self) -> tokio::sync::broadcast::Receiver<StorageChange> {
        self.lock_state().store.subscribe()
    }

    pub(crate) fn is_foreign_change(&self, change: &StorageChange) -> bool {
        self.lock_state().store.is_foreign_change(change)
    }

    /// Re-reads storage after another instance wrote it and reconciles the
    /// result locally. Only the cache is updated; storage already holds
    /// the value.
    pub(crate) fn apply_foreign_change(&self) {
        let _pass = self.lock_pass();
        let event = {
            let mut state = self.lock_state();
            if state.store.is_degraded() {
                return;
            }
            let loaded = state.store.load();
            if state.store.is_degraded() {
                // The read failed, which says nothing about the session.
                return;
            }
            let observed = match loaded {
                Some(snap) => ProbeResult::Authenticated(snap),
                None => ProbeResult::Unauthenticated,
            };
            match reconcile(state.store.current(), &observed) {
                Reconciliation::Skip => None,
                Reconciliation::Apply { event, write } => {
                    match write {
                        StoreWrite::Keep => {}
                        StoreWrite::Save(snap) => state.store.adopt(Some(snap)),
                        StoreWrite::Clear => state.store.adopt(None),
                    }
                    Some(event)
                }
            }
        };

        if let Some(event) = event {
            tracing::debug!(kind = %event.kind, "reconciled change from another instance");
            self.inner.registry.publish(&event);
        }
    }

    // -- internals --------------------------------------------------------

    /// Applies a probe ticket unless a newer one already was.
    pub(crate) fn apply(&self, ticket: &ProbeTicket) -> Option<TransitionEvent> {
        let _pass = self.lock_pass();
        let event = {
            let mut state = self.lock_state();
            if ticket.seq <= state.applied_seq {
                tracing::trace!(
                    seq = ticket.seq,
                    applied = state.applied_seq,
                    "discarding probe result, newer state already applied"
                );
                return None;
            }
            state.applied_seq = ticket.seq;

            match reconcile(state.store.current(), &ticket.result) {
                Reconciliation::Skip => None,
                Reconciliation::Apply { event, write } => {
                    match write {
                        StoreWrite::Keep => {}
                        StoreWrite::Save(snap) => state.store.save(Some(snap)),
                        StoreWrite::Clear => state.store.save(None),
                    }
                    Some(event)
                }
            }
        };

        self.inner.ready.send_replace(true);

        if let Some(event) = &event {
            if event.kind.is_change() {
                tracing::info!(
                    kind = %event.kind,
                    user_id = event.current.as_ref().map(|s| s.user_id.as_str()),
                    "session transition"
                );
            }
            self.inner.registry.publish(event);
        }
        event
    }

    fn send(&self, cmd: DriverCommand) {
        if self.inner.commands.send(cmd).is_err() {
            tracing::trace!("driver not running, command dropped");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CoreState<S>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pass(&self) -> MutexGuard<'_, ()> {
        self.inner.pass.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`SessionCore`] and its [`CoreDriver`].
///
/// ```rust,ignore
/// let (core, driver) = SessionCoreBuilder::new()
///     .poll(PollConfig::with_interval(Duration::from_secs(60)))
///     .build(my_authority, Arc::new(MemoryStorage::new()));
/// tokio::spawn(driver.run());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionCoreBuilder {
    config: CoreConfig,
}

impl SessionCoreBuilder {
    /// A builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the probe timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Sets the poll timer configuration.
    pub fn poll(mut self, poll: PollConfig) -> Self {
        self.config.poll = poll;
        self
    }

    /// Sets the snapshot store configuration.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Builds the core over `authority` and `storage`.
    ///
    /// The persisted snapshot is loaded right away, so
    /// `current_snapshot()` has the optimistic value before any probe.
    /// Nothing talks to the network until the driver runs or someone
    /// calls `force_probe()`.
    pub fn build<A, S>(self, authority: A, storage: S) -> (SessionCore<A, S>, CoreDriver<A, S>)
    where
        A: AuthorityClient,
        S: SnapshotStorage,
    {
        let config = self.config.validated();
        let store = SessionStore::open(storage, config.store.clone());
        let (ready, _) = watch::channel(false);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let core = SessionCore {
            inner: Arc::new(Inner {
                prober: SessionProber::new(Arc::new(authority), config.probe_timeout),
                state: Mutex::new(CoreState {
                    store,
                    applied_seq: 0,
                }),
                pass: Mutex::new(()),
                registry: SubscriberRegistry::new(),
                ready,
                commands: cmd_tx,
            }),
        };

        let driver = CoreDriver::new(
            core.clone(),
            PollScheduler::new(config.poll),
            cmd_rx,
            config.probe_on_visible,
        );
        (core, driver)
    }

    /// Builds the core over an [`HttpAuthority`].
    ///
    /// # Errors
    /// Fails if the HTTP client can't be constructed from `authority`.
    pub fn build_http<S: SnapshotStorage>(
        self,
        authority: AuthorityConfig,
        storage: S,
    ) -> Result<(SessionCore<HttpAuthority, S>, CoreDriver<HttpAuthority, S>), AuthsyncError> {
        let authority = HttpAuthority::new(authority)?;
        Ok(self.build(authority, storage))
    }
}
