//! Shapes of the authority's session-check response.
//!
//! `GET /session-check` answers with
//! `{ "success": bool, "user"?: { "id", "name", "email", "avatar" } }`.
//! Backends are loose about this: ids arrive as numbers or strings, any
//! profile field may be missing or `null`. These types accept all of that
//! and leave the "is this a usable user?" decision to
//! [`SessionCheckResponse::into_user`].
//!
//! Any JSON value decodes. A body that is JSON but not this shape (a
//! string `user`, a non-boolean `success`, a top-level array) is flagged
//! [`malformed`](SessionCheckResponse::malformed) and reads as "no usable
//! user". Only bytes that aren't JSON at all fail to decode.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

use crate::UserId;

/// Decoded body of a session-check call.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "Loose<RawResponse>")]
pub struct SessionCheckResponse {
    pub success: bool,
    pub user: Option<WireUser>,
    /// The body was JSON of an unexpected shape.
    pub malformed: bool,
}

/// A user record as the authority sends it. Profile fields of the wrong
/// JSON type count as missing.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WireUser {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub avatar: Option<String>,
}

/// Either the expected JSON type or anything else.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose<T> {
    Expected(T),
    Unexpected(IgnoredAny),
}

impl<T> Loose<T> {
    fn expected(self) -> Option<T> {
        match self {
            Self::Expected(value) => Some(value),
            Self::Unexpected(_) => None,
        }
    }
}

/// Top-level object before interpretation.
#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    success: Option<Loose<bool>>,
    #[serde(default)]
    user: Option<Loose<WireUser>>,
}

impl From<Loose<RawResponse>> for SessionCheckResponse {
    fn from(body: Loose<RawResponse>) -> Self {
        let Some(raw) = body.expected() else {
            return Self {
                malformed: true,
                ..Self::default()
            };
        };

        let mut malformed = false;
        let success = match raw.success {
            None => false,
            Some(Loose::Expected(success)) => success,
            Some(Loose::Unexpected(_)) => {
                malformed = true;
                false
            }
        };
        let user = match raw.user {
            None => None,
            Some(Loose::Expected(user)) => Some(user),
            Some(Loose::Unexpected(_)) => {
                malformed = true;
                None
            }
        };

        Self {
            success,
            user,
            malformed,
        }
    }
}

/// `null` and values of the wrong type both become `None`.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Loose<T>>::deserialize(de)?.and_then(Loose::expected))
}

/// A user id in whichever JSON type the backend chose.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Number(i64),
    /// Objects, arrays, floats, booleans. Never a usable id.
    Other(IgnoredAny),
}

impl WireId {
    /// Normalizes to a [`UserId`]. Numbers become their decimal form.
    pub fn to_user_id(&self) -> Option<UserId> {
        match self {
            Self::Text(s) => UserId::new(s.as_str()),
            Self::Number(n) => UserId::new(n.to_string()),
            Self::Other(_) => None,
        }
    }
}

/// What a session-check response says, once the loose wire shape has been
/// interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionVerdict {
    /// `success: true` with a user carrying a usable id.
    Active {
        user_id: UserId,
        name: String,
        email: String,
        avatar: String,
    },
    /// `success: false`: the authority explicitly reports no session.
    NoSession,
    /// `success: true` but the user is missing or has no usable id, or
    /// the body was malformed.
    Unrecognized,
}

impl SessionCheckResponse {
    /// A response meaning "no session".
    pub fn no_session() -> Self {
        Self::default()
    }

    /// Interprets the response.
    pub fn into_user(self) -> SessionVerdict {
        if self.malformed {
            return SessionVerdict::Unrecognized;
        }
        if !self.success {
            return SessionVerdict::NoSession;
        }
        let Some(user) = self.user else {
            return SessionVerdict::Unrecognized;
        };
        let Some(user_id) = user.id.as_ref().and_then(WireId::to_user_id) else {
            return SessionVerdict::Unrecognized;
        };
        SessionVerdict::Active {
            user_id,
            name: user.name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            avatar: user.avatar.unwrap_or_default(),
        }
    }
}
