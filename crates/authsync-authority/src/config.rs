//! Where the authority lives and which credentials to present.

/// Connection settings for an [`HttpAuthority`](crate::HttpAuthority).
///
/// Both credential sources may be set at once; they are sent to the same
/// endpoint and the authority decides.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Base URL of the community backend, e.g. `https://community.example.com`.
    pub base_url: String,
    /// Path of the session-check endpoint. Default: `/session-check`.
    pub session_check_path: String,
    /// Path of the logout endpoint. Default: `/logout`.
    pub logout_path: String,
    /// Raw `Cookie` header value sent with every request, in addition to
    /// whatever the client's cookie jar has collected.
    pub cookie: Option<String>,
    /// OAuth access token sent as `Authorization: Bearer ...`.
    pub bearer_token: Option<String>,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            session_check_path: "/session-check".to_string(),
            logout_path: "/logout".to_string(),
            cookie: None,
            bearer_token: None,
            user_agent: concat!("authsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AuthorityConfig {
    /// Config for a base URL with default paths and no extra credentials.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load from `AUTHSYNC_BASE_URL`, plus the optional
    /// `AUTHSYNC_COOKIE` and `AUTHSYNC_BEARER_TOKEN`.
    /// Returns `None` if the base URL is missing.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("AUTHSYNC_BASE_URL").ok()?;
        Some(Self {
            base_url,
            cookie: std::env::var("AUTHSYNC_COOKIE").ok().filter(|v| !v.is_empty()),
            bearer_token: std::env::var("AUTHSYNC_BEARER_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            ..Default::default()
        })
    }

    /// Full URL of the session-check endpoint.
    pub fn session_check_url(&self) -> String {
        join(&self.base_url, &self.session_check_path)
    }

    /// Full URL of the logout endpoint.
    pub fn logout_url(&self) -> String {
        join(&self.base_url, &self.logout_path)
    }
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_check_url_joins_without_double_slash() {
        let cfg = AuthorityConfig::with_base_url("https://community.example.com/");
        assert_eq!(
            cfg.session_check_url(),
            "https://community.example.com/session-check"
        );
        assert_eq!(cfg.logout_url(), "https://community.example.com/logout");
    }

    #[test]
    fn test_custom_paths_are_used() {
        let cfg = AuthorityConfig {
            session_check_path: "api/core/me".into(),
            ..AuthorityConfig::with_base_url("http://localhost:3000")
        };
        assert_eq!(cfg.session_check_url(), "http://localhost:3000/api/core/me");
    }
}
