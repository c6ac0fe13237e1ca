//! Request lifecycle for the SecuretFlow dashboard API
//!
//! [`RequestDispatcher`] sends JSON requests relative to the API base with
//! default headers, the session's bearer token, a per-attempt deadline and
//! linear-backoff retries. [`RequestController`] wraps one logical request
//! and publishes `{data, error, loading}` while discarding the results of
//! calls that a newer call has superseded.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::Value;
//! use sf_auth::{SessionConfig, SessionManager};
//! use sf_request::{DispatcherConfig, RequestController, RequestDispatcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::from_env()?;
//!     let session = SessionManager::new(config.clone())?;
//!     session.restore();
//!
//!     let dispatcher = RequestDispatcher::new(DispatcherConfig::from_session(&config))?
//!         .with_auth(session.clone());
//!
//!     let scans = RequestController::<Value>::new();
//!     let mut updates = scans.subscribe();
//!     tokio::spawn(async move {
//!         while updates.changed().await.is_ok() {
//!             println!("scans: {:?}", updates.borrow().status());
//!         }
//!     });
//!
//!     let body = scans.get(&dispatcher, "scans").await?;
//!     println!("{body:#}");
//!     Ok(())
//! }
//! ```
//!
//! # Retries
//!
//! A failed attempt `n` (0-based) is followed by a wait of
//! `retry_delay * (n + 1)`. Timeouts and cancellations end the call at once.

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod retry;

pub use config::{DispatcherConfig, RequestOptions};
pub use controller::{Callbacks, RequestController, RequestState, RequestStatus};
pub use dispatcher::RequestDispatcher;
pub use envelope::{ApiResponse, Pagination};
pub use errors::{RequestError, Result};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;
