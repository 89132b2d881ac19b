//! The session store: the last-known auth snapshot, cached in memory and
//! mirrored to durable storage.

use std::time::Duration;

use authsync_protocol::{AuthSnapshot, Codec, JsonCodec};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::{SnapshotStorage, StorageChange, StoreError, WriterId};

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// How far in the future a snapshot's `captured_at` may lie before it is
/// treated as stale.
const CLOCK_SKEW_TOLERANCE: chrono::TimeDelta = chrono::TimeDelta::minutes(1);

/// Where and for how long snapshots are kept.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Storage key holding the snapshot. Default: `authsync.snapshot`.
    pub key: String,
    /// A persisted snapshot older than this is ignored on load.
    /// Default: 1 hour.
    pub staleness: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key: "authsync.snapshot".to_string(),
            staleness: Duration::from_secs(60 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Single source of truth for the last-known [`AuthSnapshot`].
///
/// ```text
///   open() ──load()──→ cache ←──save()── reconciler
///                        │        │
///                        │        └──→ durable storage ──→ other instances
///                        └──→ current()
/// ```
///
/// Nothing here returns an error. Corrupt or stale persisted data reads as
/// "no snapshot" and is deleted. If the backend fails, the store logs it,
/// marks itself degraded, and keeps working from the in-memory cache.
///
/// Like the rest of the core's state it's not internally synchronized:
/// the owning core keeps it behind a mutex.
pub struct SessionStore<S> {
    storage: S,
    codec: JsonCodec,
    config: StoreConfig,
    writer: WriterId,
    cache: Option<AuthSnapshot>,
    degraded: bool,
}

impl<S: SnapshotStorage> SessionStore<S> {
    /// Opens the store and seeds the cache from durable storage.
    pub fn open(storage: S, config: StoreConfig) -> Self {
        let mut store = Self {
            storage,
            codec: JsonCodec,
            config,
            writer: WriterId::random(),
            cache: None,
            degraded: false,
        };
        store.cache = store.load();
        if let Some(snap) = &store.cache {
            tracing::debug!(
                user_id = %snap.user_id,
                writer = %store.writer,
                "restored cached snapshot"
            );
        }
        store
    }

    /// Reads the persisted snapshot, judged against the current time.
    ///
    /// Does not touch the cache.
    pub fn load(&mut self) -> Option<AuthSnapshot> {
        self.load_at(Utc::now())
    }

    /// Reads the persisted snapshot, judged against `now`.
    ///
    /// Returns `None` when the entry is missing, undecodable, or older
    /// than [`StoreConfig::staleness`]. The last two are deleted from
    /// storage.
    pub fn load_at(&mut self, now: DateTime<Utc>) -> Option<AuthSnapshot> {
        if self.degraded {
            return None;
        }

        let bytes = match self.storage.get(&self.config.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                self.degrade(&e);
                return None;
            }
        };

        let snap: AuthSnapshot = match self.codec.decode(&bytes) {
            Ok(snap) => snap,
            Err(e) => {
                tracing::warn!(key = %self.config.key, error = %e, "discarding corrupt snapshot");
                self.discard();
                return None;
            }
        };

        let age = now.signed_duration_since(snap.captured_at);
        let stale = match age.to_std() {
            Ok(age) => age > self.config.staleness,
            // Captured in the future: only tolerated within clock skew.
            Err(_) => age < -CLOCK_SKEW_TOLERANCE,
        };
        if stale {
            tracing::debug!(
                user_id = %snap.user_id,
                age_secs = age.num_seconds(),
                "discarding stale snapshot"
            );
            self.discard();
            return None;
        }

        Some(snap)
    }

    /// Replaces the snapshot. `None` clears it (logout).
    ///
    /// The cache is updated before the durable write, so `current()`
    /// reflects the new value even if the write fails.
    pub fn save(&mut self, snapshot: Option<AuthSnapshot>) {
        self.cache = snapshot;
        if self.degraded {
            return;
        }

        let result = match &self.cache {
            Some(snap) => self
                .codec
                .encode(snap)
                .map_err(StoreError::from)
                .and_then(|bytes| self.storage.set(&self.config.key, &bytes, self.writer)),
            None => self.storage.remove(&self.config.key, self.writer),
        };

        if let Err(e) = result {
            self.degrade(&e);
        }
    }

    /// Replaces only the cached value. Used when another instance has
    /// already written storage.
    pub fn adopt(&mut self, snapshot: Option<AuthSnapshot>) {
        self.cache = snapshot;
    }

    /// The cached snapshot. No I/O.
    pub fn current(&self) -> Option<&AuthSnapshot> {
        self.cache.as_ref()
    }

    /// Subscribes to changes of the underlying storage.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.storage.subscribe()
    }

    /// `true` if `change` was made by another writer and concerns the
    /// snapshot key.
    pub fn is_foreign_change(&self, change: &StorageChange) -> bool {
        change.writer != self.writer && change.key == self.config.key
    }

    /// This store's writer identity.
    pub fn writer(&self) -> WriterId {
        self.writer
    }

    /// `true` once a storage failure switched the store to memory-only.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn discard(&mut self) {
        if let Err(e) = self.storage.remove(&self.config.key, self.writer) {
            self.degrade(&e);
        }
    }

    fn degrade(&mut self, error: &StoreError) {
        if !self.degraded {
            tracing::warn!(
                key = %self.config.key,
                error = %error,
                "snapshot storage unavailable, continuing in memory"
            );
        }
        self.degraded = true;
    }
}
