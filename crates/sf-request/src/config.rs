use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::errors::{RequestError, Result};

/// Per-attempt deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Additional attempts after the first one
pub const DEFAULT_RETRIES: u32 = 3;

/// Base of the linear backoff between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Options recognized by a single dispatcher call
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Caller headers, merged over the dispatcher defaults
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: &impl Serialize) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn no_retry(self) -> Self {
        self.with_retries(0)
    }

    /// Merge the caller headers over `defaults`
    pub(crate) fn merged_headers(&self, defaults: &HeaderMap) -> Result<HeaderMap> {
        let mut headers = defaults.clone();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RequestError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| RequestError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Configuration for RequestDispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Common base every path is resolved against
    pub base_url: Url,

    /// Headers sent with every request
    pub default_headers: HeaderMap,

    pub connect_timeout: Duration,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl DispatcherConfig {
    pub fn new(base_url: Url) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Self {
            base_url: sf_auth::config::normalize_base(base_url),
            default_headers,
            connect_timeout: Duration::from_secs(15),
            user_agent: Some(format!("securet-flow/{}", env!("CARGO_PKG_VERSION"))),
        }
    }

    pub fn parse(base_url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Share the API base with the session layer
    pub fn from_session(config: &sf_auth::SessionConfig) -> Self {
        Self::new(config.api_base.clone())
    }
}
