//! The auth data model: who is logged in, what a probe found, and how the
//! state changed between two probes.
//!
//! Logged-out is never a special snapshot. It is the *absence* of one:
//! `Option::<AuthSnapshot>::None`. Every `AuthSnapshot` therefore carries a
//! real [`UserId`], and the compiler keeps "half logged in" states out.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque identifier the authority assigns to a user.
///
/// Only ever compared for equality. Two snapshots describe the same user
/// if and only if their `UserId`s are equal; display name, email and
/// avatar play no part in identity.
///
/// Serialized as a bare string. Deserializing an empty string fails, so
/// a persisted record with a blank id can never come back as
/// "authenticated".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw id. Returns `None` for an empty or all-whitespace id.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ProtocolError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| ProtocolError::Invalid("empty user id".into()))
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AuthSnapshot
// ---------------------------------------------------------------------------

/// The last-known authenticated identity.
///
/// This is also the persisted layout: one JSON object with camelCase keys
/// (`userId`, `displayName`, `email`, `avatarUrl`, `capturedAt`).
/// Profile fields are plain strings; the authority leaving one out yields
/// `""`, never a missing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
    /// When the probe that produced this snapshot completed.
    pub captured_at: DateTime<Utc>,
}

impl AuthSnapshot {
    /// Creates a snapshot captured now.
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        email: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            email: email.into(),
            avatar_url: avatar_url.into(),
            captured_at: Utc::now(),
        }
    }

    /// Returns the same snapshot with a different capture time.
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }

    /// `true` if both snapshots belong to the same user.
    pub fn same_user(&self, other: &AuthSnapshot) -> bool {
        self.user_id == other.user_id
    }

    /// Compares everything except `captured_at`.
    pub fn same_profile(&self, other: &AuthSnapshot) -> bool {
        self.user_id == other.user_id
            && self.display_name == other.display_name
            && self.email == other.email
            && self.avatar_url == other.avatar_url
    }
}

// ---------------------------------------------------------------------------
// ProbeResult
// ---------------------------------------------------------------------------

/// Why a probe could not reach a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The request never got a response (DNS, connect, TLS, reset).
    Network(String),
    /// No response within the probe timeout.
    Timeout,
    /// A response arrived but the body wasn't decodable.
    Malformed(String),
    /// The authority answered with a status that says nothing about
    /// the session (5xx, 404, ...).
    Status(u16),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Timeout => f.write_str("timed out"),
            Self::Malformed(e) => write!(f, "malformed response: {e}"),
            Self::Status(code) => write!(f, "unexpected status {code}"),
        }
    }
}

/// The outcome of one round-trip to the authority.
///
/// Transient: produced by the prober, consumed by the reconciler, then
/// dropped. `Clone + PartialEq` so every caller sharing a single-flight
/// probe gets its own equal copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The authority recognises a session for this user.
    Authenticated(AuthSnapshot),
    /// The authority says there is no session.
    Unauthenticated,
    /// No verdict. Callers must keep the last snapshot, not assume logout.
    Failed(ProbeFailure),
}

impl ProbeResult {
    /// The snapshot, when authenticated.
    pub fn snapshot(&self) -> Option<&AuthSnapshot> {
        match self {
            Self::Authenticated(snap) => Some(snap),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionEvent
// ---------------------------------------------------------------------------

/// How the auth state moved between two reconciliation passes.
///
/// ```text
///               login
///   LoggedOut ─────────→ LoggedIn(A) ──user-switch──→ LoggedIn(B)
///       ↑                    │
///       └──────logout────────┘
/// ```
///
/// Anything that keeps the same state (including a profile-field change
/// for the same user) is `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Login,
    Logout,
    UserSwitch,
    Unchanged,
}

impl TransitionKind {
    /// `true` for everything except `Unchanged`.
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::UserSwitch => "user-switch",
            Self::Unchanged => "unchanged",
        })
    }
}

/// The notification payload delivered to subscribers.
///
/// `previous` and `current` are owned copies. Subscribers never get a live
/// reference into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub kind: TransitionKind,
    pub previous: Option<AuthSnapshot>,
    pub current: Option<AuthSnapshot>,
}

impl TransitionEvent {
    /// Whether a user is logged in after this transition.
    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }
}
