//! Codec trait and implementations for serializing authsync data.
//!
//! Two places turn our types into bytes: the snapshot store (persisting
//! the last-known [`AuthSnapshot`](crate::AuthSnapshot)) and the HTTP
//! authority (decoding session-check bodies). Both go through [`Codec`] so
//! neither has to know which format is in use.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside long-running
/// Tokio tasks and may be used from any worker thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is what the authority speaks and what the persisted snapshot
/// layout is defined in, so this is the only codec authsync ships.
/// It sits behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use authsync_protocol::{Codec, JsonCodec, SessionCheckResponse};
///
/// let body = br#"{"success":true,"user":{"id":7,"name":"Ada"}}"#;
/// let resp: SessionCheckResponse = JsonCodec.decode(body).unwrap();
/// assert!(resp.success);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
