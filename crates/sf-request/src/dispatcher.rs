use std::fmt;
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sf_auth::AuthHeaderProvider;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{DispatcherConfig, RequestOptions};
use crate::errors::{RequestError, Result};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Issues JSON requests against the API base with default headers,
/// bearer injection, per-attempt timeouts and linear-backoff retries.
pub struct RequestDispatcher {
    config: DispatcherConfig,
    http: Client,
    auth: Option<Arc<dyn AuthHeaderProvider>>,
}

impl RequestDispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        Ok(Self::with_client(config, builder.build()?))
    }

    /// Use a preconfigured HTTP client instead of building one from `config`
    pub fn with_client(config: DispatcherConfig, http: Client) -> Self {
        Self {
            config,
            http,
            auth: None,
        }
    }

    /// Attach the session whose `Authorization` header is sent with every attempt
    pub fn with_auth(mut self, provider: Arc<dyn AuthHeaderProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    /// Resolve a relative path against the API base
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.config.base_url.join(path.trim_start_matches('/'))?)
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_with_cancel(method, path, options, &CancellationToken::new())
            .await
    }

    /// Like [`request`](Self::request), aborting with
    /// [`RequestError::Cancelled`] as soon as `cancel` fires, including
    /// while waiting between retries.
    #[instrument(skip(self, options, cancel))]
    pub async fn request_with_cancel<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let url = self.resolve(path)?;
        let headers = options.merged_headers(&self.config.default_headers)?;
        let policy = RetryPolicy::new(options.retries, options.retry_delay);

        let run = retry_with_backoff(&policy, |attempt| {
            self.attempt(
                method.clone(),
                url.clone(),
                headers.clone(),
                &options,
                attempt,
            )
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "Request cancelled");
                Err(RequestError::Cancelled)
            }
            result = run => result,
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<T> {
        // Read per attempt so a refresh between retries is picked up.
        if let Some(header) = self.auth.as_ref().and_then(|auth| auth.auth_header()) {
            let value = HeaderValue::from_str(&header)
                .map_err(|_| RequestError::InvalidHeader(AUTHORIZATION.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        debug!(%url, attempt = attempt + 1, "Dispatching request");

        let mut builder = self.http.request(method, url).headers(headers);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        match tokio::time::timeout(options.timeout, send(builder)).await {
            // The client's own deadline fired first; report it like ours.
            Ok(Err(RequestError::Network(e))) if e.is_timeout() => {
                debug!(%e, "Transport timed out");
                Err(RequestError::Timeout(started.elapsed()))
            }
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout(options.timeout)),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, RequestOptions::default())
            .await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let options = query
            .iter()
            .fold(RequestOptions::default(), |options, (k, v)| options.query(*k, *v));
        self.request(Method::GET, path, options).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let options = RequestOptions::default().json(body)?;
        self.request(Method::POST, path, options).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let options = RequestOptions::default().json(body)?;
        self.request(Method::PUT, path, options).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let options = RequestOptions::default().json(body)?;
        self.request(Method::PATCH, path, options).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::DELETE, path, RequestOptions::default())
            .await
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("base_url", &self.config.base_url.as_str())
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
    let response = builder.send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let text = String::from_utf8_lossy(&body);
        let err = RequestError::from_response_body(status, &text);
        debug!(status = status.as_u16(), "Request failed: {}", err);
        return Err(err);
    }

    // 204 and friends carry no body; hand `null` to the caller's type.
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }

    Ok(serde_json::from_slice(&body)?)
}
