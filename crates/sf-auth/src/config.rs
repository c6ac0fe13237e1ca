use std::time::Duration;
use url::Url;

use crate::errors::Result;

/// Authentication endpoints, relative to the API base
pub mod endpoints {
    pub const LOGIN: &str = "auth/login";
    pub const LOGOUT: &str = "auth/logout";
    pub const REFRESH: &str = "auth/refresh";
    pub const PROFILE: &str = "auth/profile";
}

/// Persisted state layout
pub mod keys {
    pub const ACCESS_TOKEN: &str = "auth_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER: &str = "auth_user";
}

/// Default API base when nothing else is configured
pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api/v1";

/// Environment variable overriding the API base
pub const API_BASE_ENV: &str = "SF_API_URL";

/// Delay before a stored token is proactively refreshed.
///
/// Fixed cadence, independent of the token's `expires_in`.
pub const REFRESH_DELAY: Duration = Duration::from_secs(300);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Configuration for SessionManager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL every auth endpoint is resolved against
    pub api_base: Url,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Delay used when arming the proactive refresh timer
    pub refresh_delay: Duration,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl SessionConfig {
    /// Create config for the given API base
    pub fn new(api_base: Url) -> Self {
        Self {
            api_base: normalize_base(api_base),
            http_timeouts: HttpTimeouts::default(),
            refresh_delay: REFRESH_DELAY,
            user_agent: Some(default_user_agent()),
        }
    }

    /// Parse the API base from a string
    pub fn parse(api_base: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(api_base)?))
    }

    /// Create config from `SF_API_URL`, falling back to the local default
    pub fn from_env() -> Result<Self> {
        let base = std::env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::parse(&base)
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.http_timeouts = timeouts;
        self
    }

    /// Resolve an endpoint path against the API base
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.api_base.join(path.trim_start_matches('/'))?)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Url::parse(DEFAULT_API_BASE).expect("valid default API base"))
    }
}

/// Ensure the base ends with a slash so `Url::join` appends instead of replacing
/// the last path segment.
pub fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn default_user_agent() -> String {
    format!("securet-flow/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = SessionConfig::parse("http://localhost:8000/api/v1").unwrap();
        assert_eq!(
            config.endpoint(endpoints::LOGIN).unwrap().as_str(),
            "http://localhost:8000/api/v1/auth/login"
        );
        assert_eq!(
            config.endpoint("/auth/profile").unwrap().as_str(),
            "http://localhost:8000/api/v1/auth/profile"
        );
    }

    #[test]
    fn test_default_refresh_delay_is_five_minutes() {
        let config = SessionConfig::default();
        assert_eq!(config.refresh_delay, Duration::from_secs(300));
    }

    #[test]
    fn test_with_timeouts_replaces_defaults() {
        let config = SessionConfig::default().with_timeouts(HttpTimeouts {
            connect: Duration::from_secs(2),
            request: Duration::from_secs(5),
        });
        assert_eq!(config.http_timeouts.connect, Duration::from_secs(2));
        assert_eq!(config.http_timeouts.request, Duration::from_secs(5));
    }
}
