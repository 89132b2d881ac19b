//! Authority client abstraction for authsync.
//!
//! The *authority* is the backend that knows whether the current
//! credentials belong to a live session. authsync only ever asks it two
//! things, so the [`AuthorityClient`] trait has two methods.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpAuthority`], a `reqwest` client for the
//!   `GET /session-check` + `POST /logout` endpoint pair.

#![allow(async_fn_in_trait)]

mod config;
mod error;
#[cfg(feature = "http")]
mod http;

pub use config::AuthorityConfig;
pub use error::AuthorityError;
#[cfg(feature = "http")]
pub use http::HttpAuthority;

use std::future::Future;
use std::sync::Arc;

use authsync_protocol::SessionCheckResponse;

/// The source of truth for authentication state.
///
/// `Send + Sync + 'static` because one client is shared by the prober,
/// the background driver and `logout()` for the life of the core.
///
/// # Example
///
/// ```rust
/// use authsync_authority::{AuthorityClient, AuthorityError};
/// use authsync_protocol::SessionCheckResponse;
///
/// /// Always reports "nobody is logged in".
/// struct Anonymous;
///
/// impl AuthorityClient for Anonymous {
///     async fn check_session(&self) -> Result<SessionCheckResponse, AuthorityError> {
///         Ok(SessionCheckResponse::no_session())
///     }
///
///     async fn logout(&self) -> Result<(), AuthorityError> {
///         Ok(())
///     }
/// }
/// ```
pub trait AuthorityClient: Send + Sync + 'static {
    /// Asks the authority for the current session.
    ///
    /// `Ok` means the authority gave a verdict (which may be "no
    /// session"). `Err` means it didn't.
    fn check_session(
        &self,
    ) -> impl Future<Output = Result<SessionCheckResponse, AuthorityError>> + Send;

    /// Tells the authority to end the session. Callers treat this as
    /// best-effort.
    fn logout(&self) -> impl Future<Output = Result<(), AuthorityError>> + Send;
}

impl<A: AuthorityClient> AuthorityClient for Arc<A> {
    fn check_session(
        &self,
    ) -> impl Future<Output = Result<SessionCheckResponse, AuthorityError>> + Send {
        (**self).check_session()
    }

    fn logout(&self) -> impl Future<Output = Result<(), AuthorityError>> + Send {
        (**self).logout()
    }
}
