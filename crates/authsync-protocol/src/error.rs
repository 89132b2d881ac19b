//! Error types for the protocol layer.
//!
//! Each authsync crate defines its own error enum. A `ProtocolError` always
//! means "these bytes could not become (or come from) one of our types",
//! never a network or storage problem.

/// Errors that can occur while encoding or decoding authsync data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (Rust value → bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (bytes → Rust value).
    ///
    /// Common causes: a body that isn't JSON at all (an HTML error page
    /// from a proxy), a truncated payload, or a persisted snapshot written
    /// by an incompatible version.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The data parsed but breaks a rule of the model, such as an empty
    /// user id.
    #[error("invalid data: {0}")]
    Invalid(String),
}
