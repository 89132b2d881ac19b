//! Error types for the storage layer.

use authsync_protocol::ProtocolError;

/// Errors from a [`SnapshotStorage`](crate::SnapshotStorage) backend.
///
/// `SessionStore` never returns these to its callers. It logs them and
/// falls back to memory-only operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing files failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refuses all access (blocked storage, quota exceeded).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A persisted value couldn't be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),
}
