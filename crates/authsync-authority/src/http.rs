//! `reqwest`-backed authority client.

use authsync_protocol::{Codec, JsonCodec, SessionCheckResponse};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};

use crate::{AuthorityClient, AuthorityConfig, AuthorityError};

/// Talks to a community backend over HTTP.
///
/// Credentials always travel with the request: the client keeps a cookie
/// jar across calls, and the configured cookie / bearer token are added
/// on top.
///
/// Status handling for session-check:
/// - 2xx → body decoded as [`SessionCheckResponse`]
/// - 401 / 403 → treated as an explicit "no session"
/// - anything else → [`AuthorityError::Status`]
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    http: Client,
    config: AuthorityConfig,
}

impl HttpAuthority {
    /// Builds the client.
    ///
    /// # Errors
    /// [`AuthorityError::Config`] if the cookie isn't a valid header value
    /// or the TLS backend fails to initialize.
    pub fn new(config: AuthorityConfig) -> Result<Self, AuthorityError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| AuthorityError::Config(format!("cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| AuthorityError::Config(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// The config this client was built from.
    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    fn with_credentials(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

impl AuthorityClient for HttpAuthority {
    async fn check_session(&self) -> Result<SessionCheckResponse, AuthorityError> {
        let url = self.config.session_check_url();
        let resp = self
            .with_credentials(self.http.get(&url).header("Accept", "application/json"))
            .send()
            .await
            .map_err(|e| AuthorityError::Request(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::debug!(%url, status = status.as_u16(), "session-check rejected credentials");
            return Ok(SessionCheckResponse::no_session());
        }
        if !status.is_success() {
            return Err(AuthorityError::Status(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| AuthorityError::Request(e.to_string()))?;
        Ok(JsonCodec.decode(&body)?)
    }

    async fn logout(&self) -> Result<(), AuthorityError> {
        let url = self.config.logout_url();
        let resp = self
            .with_credentials(self.http.post(&url))
            .send()
            .await
            .map_err(|e| AuthorityError::Request(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuthorityError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_cookie_with_newline() {
        let cfg = AuthorityConfig {
            cookie: Some("sid=abc\r\nX-Evil: 1".into()),
            ..AuthorityConfig::default()
        };
        let result = HttpAuthority::new(cfg);
        assert!(matches!(result, Err(AuthorityError::Config(_))));
    }

    #[test]
    fn test_new_accepts_plain_config() {
        let auth = HttpAuthority::new(AuthorityConfig::with_base_url("http://localhost:9"))
            .expect("should build");
        assert_eq!(auth.config().base_url, "http://localhost:9");
    }
}
