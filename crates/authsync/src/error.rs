//! Unified error type for authsync.

use authsync_authority::AuthorityError;
use authsync_protocol::ProtocolError;
use authsync_store::StoreError;

/// Top-level error wrapping every crate-specific error.
///
/// The runtime paths of the core (probing, reconciling, logging out)
/// never return this: their failures are logged and absorbed. It shows up
/// when *setting up* a core: loading configuration or building an HTTP
/// authority client.
#[derive(Debug, thiserror::Error)]
pub enum AuthsyncError {
    /// An authority-level error (client construction, request, status).
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// A storage-level error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An encode/decode error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}
