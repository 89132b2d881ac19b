//! Errors from talking to the authority.

use authsync_protocol::ProtocolError;

/// What can go wrong during one call to the authority.
///
/// None of these say anything about whether the user is logged in. The
/// prober maps all of them to a failed probe so the last snapshot stays.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// The request never produced a response (connect, TLS, reset, DNS).
    #[error("request failed: {0}")]
    Request(String),

    /// The authority answered with a status that carries no session
    /// verdict.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The response body could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The client could not be constructed (bad base URL, TLS setup).
    #[error("invalid authority configuration: {0}")]
    Config(String),
}
