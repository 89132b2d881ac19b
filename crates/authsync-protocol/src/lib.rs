//! Data model and wire format for authsync.
//!
//! - **Model** ([`AuthSnapshot`], [`ProbeResult`], [`TransitionEvent`]):
//!   the values the rest of the workspace passes around.
//! - **Wire** ([`SessionCheckResponse`]): what the authority's
//!   session-check endpoint returns, and how to read it.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes in, bytes out.
//!
//! ```text
//! Authority (HTTP) → Protocol (SessionCheckResponse → AuthSnapshot) → Store / Reconciler
//! ```

mod codec;
mod error;
mod types;
mod wire;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AuthSnapshot, ProbeFailure, ProbeResult, TransitionEvent, TransitionKind, UserId,
};
pub use wire::{SessionCheckResponse, SessionVerdict, WireId, WireUser};
