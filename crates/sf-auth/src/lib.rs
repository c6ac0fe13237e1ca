//! Client-side session layer for the SecuretFlow dashboard API
//!
//! This crate owns everything about "who is logged in":
//!
//! 1. Placement and lifetime of the access/refresh token pair ([`TokenStore`])
//! 2. Login, logout and profile calls against the `auth/*` endpoints
//! 3. Proactive token refresh on a single armed timer
//! 4. The `Authorization` header consumed by the request layer
//! 5. A redacting audit trail of every session transition
//!
//! # Example
//!
//! ```no_run
//! use sf_auth::{SessionConfig, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::parse("https://api.securetflow.com/api/v1")?;
//!     let session = SessionManager::new(config)?;
//!
//!     let login = session.login("admin@securet-flow.com", "admin123").await?;
//!     println!("Logged in as: {}", login.user.name);
//!     assert_eq!(session.auth_header(), Some(format!("Bearer {}", login.token.access_token)));
//!
//!     // Logout never fails; the session is Anonymous afterwards.
//!     session.logout().await;
//!     assert!(!session.is_authenticated());
//!     Ok(())
//! }
//! ```
//!
//! # Token Storage
//!
//! [`TokenStore`] ranks two [`TokenStorage`] strategies. The primary is probed
//! once; when it cannot hold values (for example secure cookies on a plain-HTTP
//! origin) every write goes to the fallback.
//!
//! ```
//! use sf_auth::{AuthToken, TokenStore};
//! use url::Url;
//!
//! let origin = Url::parse("https://dashboard.securetflow.com/").unwrap();
//! let store = TokenStore::for_origin(&origin);
//! assert_eq!(store.active_storage(), "cookie");
//!
//! store.set_token(&AuthToken::new("T1", "R1", 3600)).unwrap();
//! assert_eq!(store.access_token().as_deref(), Some("T1"));
//!
//! store.clear();
//! assert_eq!(store.refresh_token(), None);
//! ```
//!
//! Refreshing with nothing to refresh is the one refresh failure a caller sees:
//!
//! ```
//! use sf_auth::{SessionConfig, SessionManager, SfAuthError, TokenStore};
//!
//! let session = SessionManager::builder(SessionConfig::default())
//!     .token_store(TokenStore::in_memory())
//!     .build()
//!     .unwrap();
//!
//! let err = tokio_test::block_on(session.refresh_token()).unwrap_err();
//! assert!(matches!(err, SfAuthError::NoRefreshToken));
//! ```
//!
//! # Important Notes
//!
//! - Tokens are not encrypted at rest; confidentiality relies on the storage
//!   mechanism (cookie flags, file permissions, process memory)
//! - A failed refresh always ends the session instead of retrying
//! - Concurrent `refresh_token()` calls are not coalesced
//! - A refresh still in flight when the session is cleared is discarded on
//!   completion rather than re-establishing the session

pub mod audit;
pub mod config;
pub mod errors;
pub mod file_store;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod store;

// Re-export main types
pub use audit::{AuditEntry, AuditLog, AuditSink, AuthEvent, EventKind, TracingAuditSink, redact};
pub use config::{HttpTimeouts, REFRESH_DELAY, SessionConfig};
pub use errors::{Result, SfAuthError};
pub use file_store::FileStorage;
pub use models::{AuthToken, LoginResponse, User, UserUpdate};
pub use scheduler::{ScheduledTask, Scheduler, TimerHandle, TokioScheduler};
pub use session::{AuthHeaderProvider, SessionManager, SessionManagerBuilder, SessionState};
pub use store::{CookieStorage, SessionStorage, TokenStorage, TokenStore};
