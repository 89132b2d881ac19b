//! The session prober: one round-trip to the authority, de-duplicated.
//!
//! # Single-flight
//!
//! Several triggers can ask for a probe at once: the poll timer, a tab
//! becoming visible, a popup login flow closing. While one request is
//! outstanding, every further [`SessionProber::probe`] call joins it
//! instead of issuing its own. All of them get the same [`ProbeTicket`].
//!
//! ```text
//! probe() ──┐
//! probe() ──┼──→ [ one Shared future ] ──→ check_session() ──→ ProbeTicket { seq: 7, .. }
//! probe() ──┘                                                  (cloned to every caller)
//! ```
//!
//! # Sequencing
//!
//! Each request gets a `seq` when it *starts*. The core applies a ticket
//! only if its `seq` is newer than the last one applied, so a slow old
//! result can't overwrite a newer one, and the callers sharing a flight
//! don't reconcile the same result twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use authsync_authority::{AuthorityClient, AuthorityError};
use authsync_protocol::{
    AuthSnapshot, ProbeFailure, ProbeResult, SessionCheckResponse, SessionVerdict,
};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

type InFlight = Shared<BoxFuture<'static, ProbeTicket>>;

/// A probe result tagged with the sequence number of its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTicket {
    pub seq: u64,
    pub result: ProbeResult,
}

/// Issues session-check requests with a timeout and single-flight
/// de-duplication.
pub struct SessionProber<A> {
    authority: Arc<A>,
    timeout: Duration,
    issued: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
}

impl<A: AuthorityClient> SessionProber<A> {
    pub fn new(authority: Arc<A>, timeout: Duration) -> Self {
        Self {
            authority,
            timeout,
            issued: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    /// Probes the authority, joining the outstanding request if there is
    /// one.
    pub async fn probe(&self) -> ProbeTicket {
        let flight = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                // `peek` is `Some` once the shared future has completed.
                Some(flight) if flight.peek().is_none() => {
                    tracing::trace!("joining in-flight probe");
                    flight.clone()
                }
                _ => {
                    let flight = self.start();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    /// Sequence number of the most recently started request (0 if none).
    pub fn last_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// The authority this prober talks to.
    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    fn start(&self) -> InFlight {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let authority = Arc::clone(&self.authority);
        let timeout = self.timeout;
        tracing::debug!(seq, "starting session probe");

        async move {
            let result = run_probe(authority.as_ref(), timeout).await;
            ProbeTicket { seq, result }
        }
        .boxed()
        .shared()
    }
}

async fn run_probe<A: AuthorityClient>(authority: &A, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, authority.check_session()).await {
        Ok(Ok(resp)) => classify(resp, Utc::now()),
        Ok(Err(e)) => ProbeResult::Failed(failure_from(e)),
        Err(_) => ProbeResult::Failed(ProbeFailure::Timeout),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        ProbeResult::Authenticated(snap) => {
            tracing::debug!(elapsed_ms, user_id = %snap.user_id, "probe: authenticated");
        }
        ProbeResult::Unauthenticated => {
            tracing::debug!(elapsed_ms, "probe: no session");
        }
        ProbeResult::Failed(failure) => {
            tracing::info!(elapsed_ms, %failure, "probe failed, keeping last snapshot");
        }
    }
    result
}

/// Turns a session-check response into a probe result captured at `now`.
///
/// `success: true` without a usable user, or a body of unexpected shape,
/// is read as logged out and logged, never as a failure.
pub fn classify(resp: SessionCheckResponse, now: DateTime<Utc>) -> ProbeResult {
    let malformed = resp.malformed;
    match resp.into_user() {
        SessionVerdict::Active {
            user_id,
            name,
            email,
            avatar,
        } => ProbeResult::Authenticated(AuthSnapshot::new(user_id, name, email, avatar).captured_at(now)),
        SessionVerdict::NoSession => ProbeResult::Unauthenticated,
        SessionVerdict::Unrecognized => {
            tracing::warn!(malformed, "session-check response has no usable user, treating as logged out");
            ProbeResult::Unauthenticated
        }
    }
}

fn failure_from(err: AuthorityError) -> ProbeFailure {
    match err {
        AuthorityError::Request(msg) | AuthorityError::Config(msg) => ProbeFailure::Network(msg),
        AuthorityError::Status(code) => ProbeFailure::Status(code),
        AuthorityError::Protocol(e) => ProbeFailure::Malformed(e.to_string()),
    }
}
