//! Durable auth snapshot storage for authsync.
//!
//! 1. **Backends**: where bytes live ([`SnapshotStorage`] trait,
//!    [`MemoryStorage`], [`FileStorage`])
//! 2. **Store**: the last-known snapshot with an in-memory cache,
//!    staleness and corruption handling ([`SessionStore`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Core (above)      ← saves reconciled snapshots, reacts to sibling writes
//!     ↕
//! Store (this crate) ← cache + durable copy + change feed
//!     ↕
//! Protocol (below)   ← AuthSnapshot, JsonCodec
//! ```

mod error;
mod file;
mod storage;
mod store;

pub use error::StoreError;
pub use file::FileStorage;
pub use storage::{MemoryStorage, SnapshotStorage, StorageChange, WriterId};
pub use store::{SessionStore, StoreConfig};
