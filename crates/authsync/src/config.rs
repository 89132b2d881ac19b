//! Core configuration.

use std::time::Duration;

use authsync_poll::PollConfig;
use authsync_store::StoreConfig;

use crate::AuthsyncError;

/// Everything a [`SessionCore`](crate::SessionCore) needs to know besides
/// its authority and storage.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// A probe that hasn't answered by now counts as failed. Default: 10 s.
    pub probe_timeout: Duration,
    /// Periodic re-probe timer.
    pub poll: PollConfig,
    /// Snapshot key and staleness.
    pub store: StoreConfig,
    /// Probe right away when the instance becomes visible again.
    /// Default: `true`.
    pub probe_on_visible: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            poll: PollConfig::default(),
            store: StoreConfig::default(),
            probe_on_visible: true,
        }
    }
}

impl CoreConfig {
    /// Bounds for `probe_timeout`.
    pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
    pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Clamps out-of-range values.
    pub fn validated(mut self) -> Self {
        let clamped = self
            .probe_timeout
            .clamp(Self::MIN_PROBE_TIMEOUT, Self::MAX_PROBE_TIMEOUT);
        if clamped != self.probe_timeout {
            tracing::warn!(
                requested_ms = self.probe_timeout.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "probe timeout out of range, clamping"
            );
            self.probe_timeout = clamped;
        }
        self.poll = self.poll.validated();
        self
    }

    /// Defaults overridden by any of these variables that are set:
    ///
    /// | variable | field |
    /// |---|---|
    /// | `AUTHSYNC_PROBE_TIMEOUT_SECS` | `probe_timeout` |
    /// | `AUTHSYNC_POLL_INTERVAL_SECS` | `poll.interval` (0 disables) |
    /// | `AUTHSYNC_STORAGE_KEY` | `store.key` |
    /// | `AUTHSYNC_STALENESS_SECS` | `store.staleness` |
    ///
    /// # Errors
    /// [`AuthsyncError::Config`] if a numeric variable doesn't parse.
    pub fn from_env() -> Result<Self, AuthsyncError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AuthsyncError> {
        let mut cfg = Self::default();
        if let Some(secs) = secs_var(&lookup, "AUTHSYNC_PROBE_TIMEOUT_SECS")? {
            cfg.probe_timeout = secs;
        }
        if let Some(secs) = secs_var(&lookup, "AUTHSYNC_POLL_INTERVAL_SECS")? {
            cfg.poll.interval = secs;
        }
        if let Some(key) = lookup("AUTHSYNC_STORAGE_KEY").filter(|k| !k.is_empty()) {
            cfg.store.key = key;
        }
        if let Some(secs) = secs_var(&lookup, "AUTHSYNC_STALENESS_SECS")? {
            cfg.store.staleness = secs;
        }
        Ok(cfg)
    }
}

fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<Duration>, AuthsyncError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|e| AuthsyncError::Config(format!("{name}={raw:?}: {e}")))
}
