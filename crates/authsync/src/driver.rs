//! The background loop that keeps a [`SessionCore`] fresh.
//!
//! The driver owns everything that happens without a caller asking:
//!
//! ```text
//!   ┌──────────── CoreDriver::run ────────────┐
//!   │  start: spawn probe (resolves ready())  │
//!   │  loop select! {                         │
//!   │    command     → visibility / shutdown  │
//!   │    storage     → foreign change? adopt  │
//!   │    poll timer  → spawn probe            │
//!   │    probe task  → reap                   │
//!   │  }                                      │
//!   └─────────────────────────────────────────┘
//! ```
//!
//! Spawn it once with `tokio::spawn(driver.run())`. It stops on
//! [`SessionCore::shutdown`], even while a probe is outstanding; probes
//! the driver started are aborted.

use authsync_authority::AuthorityClient;
use authsync_poll::PollScheduler;
use authsync_store::{SnapshotStorage, StorageChange};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::SessionCore;

/// Messages from [`SessionCore`] handles to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverCommand {
    Visibility(bool),
    Shutdown,
}

/// Runs periodic probes and cross-instance reconciliation for one core.
pub struct CoreDriver<A, S> {
    core: SessionCore<A, S>,
    scheduler: PollScheduler,
    storage: broadcast::Receiver<StorageChange>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    probe_on_visible: bool,
    /// Probes run as tasks so the loop keeps serving commands and storage
    /// changes while the authority is slow. Dropped (and aborted) on exit.
    probes: JoinSet<()>,
}

impl<A: AuthorityClient, S: SnapshotStorage> CoreDriver<A, S> {
    pub(crate) fn new(
        core: SessionCore<A, S>,
        scheduler: PollScheduler,
        commands: mpsc::UnboundedReceiver<DriverCommand>,
        probe_on_visible: bool,
    ) -> Self {
        let storage = core.subscribe_storage();
        Self {
            core,
            scheduler,
            storage,
            commands,
            probe_on_visible,
            probes: JoinSet::new(),
        }
    }

    /// Runs until shutdown.
    pub async fn run(mut self) {
        tracing::info!(
            poll_interval_secs = self.scheduler.interval().as_secs(),
            polling = self.scheduler.is_enabled(),
            "session driver started"
        );

        self.spawn_probe();

        let mut storage_open = true;
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(DriverCommand::Visibility(visible)) => self.on_visibility(visible),
                    Some(DriverCommand::Shutdown) | None => break,
                },
                change = self.storage.recv(), if storage_open => match change {
                    Ok(change) => {
                        if self.core.is_foreign_change(&change) {
                            tracing::trace!(writer = %change.writer, "storage changed by another instance");
                            self.core.apply_foreign_change();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Only the latest value matters; re-read it.
                        tracing::debug!(skipped, "storage change feed lagged");
                        self.core.apply_foreign_change();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("storage change feed closed");
                        storage_open = false;
                    }
                },
                info = self.scheduler.wait_for_poll() => {
                    tracing::trace!(poll = info.poll, missed = info.missed, "periodic probe");
                    self.spawn_probe();
                }
                Some(done) = self.probes.join_next(), if !self.probes.is_empty() => {
                    if let Err(e) = done {
                        tracing::error!(error = %e, "probe task failed");
                    }
                }
            }
        }

        tracing::info!(in_flight = self.probes.len(), "session driver stopped");
    }

    /// Starts a probe and pushes the next poll a full interval out.
    fn spawn_probe(&mut self) {
        let core = self.core.clone();
        self.probes.spawn(async move {
            core.force_probe().await;
        });
        self.scheduler.reset();
    }

    fn on_visibility(&mut self, visible: bool) {
        if !visible {
            self.scheduler.pause();
            return;
        }

        let was_paused = self.scheduler.is_paused();
        self.scheduler.resume();
        if was_paused && self.probe_on_visible {
            tracing::debug!("visible again, probing");
            self.spawn_probe();
        }
    }
}
