//! # authsync
//!
//! Keeps one client instance's idea of "who is logged in" in step with a
//! remote authority, and with sibling instances sharing the same storage.
//!
//! This is the umbrella crate. It re-exports the building blocks and adds
//! the pieces that tie them together:
//!
//! - [`SessionProber`]: timed, single-flight session checks
//! - [`SessionCore`]: the handle UI code uses (`on_transition`,
//!   `current_snapshot`, `force_probe`, `logout`, `ready`)
//! - [`CoreDriver`]: the background loop (initial probe, poll timer,
//!   cross-instance storage changes, visibility)
//!
//! # Data flow
//!
//! ```text
//! poll timer ─┐
//! visible ────┼─→ SessionProber ─→ reconcile(prior, result) ─→ SessionStore ─→ SubscriberRegistry
//! force_probe ┘        │                                          │               │
//!                 AuthorityClient                          other instances    your handlers
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use authsync::prelude::*;
//!
//! # async fn run() -> Result<(), AuthsyncError> {
//! let (core, driver) = SessionCoreBuilder::new().build_http(
//!     AuthorityConfig::with_base_url("https://community.example.com"),
//!     MemoryStorage::new(),
//! )?;
//! tokio::spawn(driver.run());
//!
//! let _badge = core.on_transition(|event| match event.kind {
//!     TransitionKind::Login | TransitionKind::UserSwitch => println!("hello"),
//!     TransitionKind::Logout => println!("bye"),
//!     TransitionKind::Unchanged => {}
//! });
//! core.ready().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Sub-crates
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `authsync-protocol` | Snapshot, probe and event types; wire format; JSON codec |
//! | `authsync-authority` | `AuthorityClient` trait, HTTP implementation |
//! | `authsync-store` | `SessionStore`, memory and file storage backends |
//! | `authsync-reconcile` | Transition state machine, subscriber registry |
//! | `authsync-poll` | Pausable periodic timer |

mod config;
mod driver;
mod error;
mod prober;
mod session;

pub use config::CoreConfig;
pub use driver::CoreDriver;
pub use error::AuthsyncError;
pub use prober::{ProbeTicket, SessionProber, classify};
pub use session::{SessionCore, SessionCoreBuilder};

pub use authsync_authority as authority;
pub use authsync_poll as poll;
pub use authsync_protocol as protocol;
pub use authsync_reconcile as reconcile;
pub use authsync_store as store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::{AuthsyncError, CoreConfig, CoreDriver, SessionCore, SessionCoreBuilder};
    pub use authsync_authority::{AuthorityClient, AuthorityConfig, AuthorityError, HttpAuthority};
    pub use authsync_poll::PollConfig;
    pub use authsync_protocol::{
        AuthSnapshot, ProbeFailure, ProbeResult, TransitionEvent, TransitionKind, UserId,
    };
    pub use authsync_reconcile::Subscription;
    pub use authsync_store::{FileStorage, MemoryStorage, SnapshotStorage, StoreConfig};
}
