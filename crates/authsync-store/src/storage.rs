//! Durable key-value backends shared between core instances.
//!
//! A storage backend plays the role of a browser origin's `localStorage`:
//! several core instances (tabs) may share one, writes are
//! last-write-wins, and every write is announced to the *other*
//! instances through a [`StorageChange`] feed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::broadcast;

use crate::StoreError;

/// Capacity of each backend's change feed. A receiver that falls this far
/// behind gets `RecvError::Lagged` and should simply re-read storage.
const CHANGE_FEED_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// WriterId / StorageChange
// ---------------------------------------------------------------------------

/// Random identity of one writer (one `SessionStore`).
///
/// Lets an instance recognise, and skip, change notifications for its own
/// writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriterId(u64);

impl WriterId {
    /// A fresh random id.
    pub fn random() -> Self {
        Self(rand::rng().random())
    }

    /// Wraps a fixed value. Handy for tests.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w-{:016x}", self.0)
    }
}

/// Announcement that `key` was written or removed by `writer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub writer: WriterId,
}

/// Broadcast sender shared by the built-in backends.
#[derive(Debug, Clone)]
pub(crate) struct ChangeFeed(broadcast::Sender<StorageChange>);

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self(tx)
    }

    pub(crate) fn notify(&self, key: &str, writer: WriterId) {
        // No receivers is fine: nobody else is listening.
        let _ = self.0.send(StorageChange {
            key: key.to_string(),
            writer,
        });
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.0.subscribe()
    }
}

// ---------------------------------------------------------------------------
// SnapshotStorage
// ---------------------------------------------------------------------------

/// A durable key-value store with change notifications.
///
/// All methods are synchronous. Storage access is never a suspension
/// point; only the authority call is.
pub trait SnapshotStorage: Send + Sync + 'static {
    /// Reads `key`. `Ok(None)` if it was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrites `key` and announces the change.
    fn set(&self, key: &str, value: &[u8], writer: WriterId) -> Result<(), StoreError>;

    /// Deletes `key` (a no-op if absent) and announces the change.
    fn remove(&self, key: &str, writer: WriterId) -> Result<(), StoreError>;

    /// Subscribes to changes made through this backend by any writer.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

impl<S: SnapshotStorage> SnapshotStorage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8], writer: WriterId) -> Result<(), StoreError> {
        (**self).set(key, value, writer)
    }

    fn remove(&self, key: &str, writer: WriterId) -> Result<(), StoreError> {
        (**self).remove(key, writer)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        (**self).subscribe()
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-process storage. Share one `Arc<MemoryStorage>` between several
/// cores to model tabs of the same origin.
///
/// [`set_unavailable`](Self::set_unavailable) makes every call fail, the
/// way a blocked or full `localStorage` would.
#[derive(Debug)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
    feed: ChangeFeed,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            feed: ChangeFeed::new(),
        }
    }

    /// Toggles simulated unavailability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory storage disabled".into()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // Every operation is a single insert/remove, so a poisoned map is
        // still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8], writer: WriterId) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().insert(key.to_string(), value.to_vec());
        self.feed.notify(key, writer);
        Ok(())
    }

    fn remove(&self, key: &str, writer: WriterId) -> Result<(), StoreError> {
        self.check_available()?;
        let existed = self.lock().remove(key).is_some();
        if existed {
            self.feed.notify(key, writer);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}
