use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::audit::{AuditLog, AuditSink, AuthEvent};
use crate::config::{SessionConfig, endpoints};
use crate::errors::{Result, SfAuthError};
use crate::models::{AuthToken, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, User, UserUpdate};
use crate::scheduler::{ScheduledTask, Scheduler, TimerHandle, TokioScheduler};
use crate::store::TokenStore;

/// Source of the `Authorization` header value for outgoing requests
pub trait AuthHeaderProvider: Send + Sync {
    fn auth_header(&self) -> Option<String>;
}

/// Derived session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

/// Owner of the token pair, the user record and the proactive refresh timer.
///
/// Construct one per process and share it by `Arc`. It is the only component
/// that writes to its [`TokenStore`]; token and user are always set and
/// cleared together.
pub struct SessionManager {
    config: SessionConfig,
    http: Client,
    store: TokenStore,
    user: RwLock<Option<User>>,
    refresh_timer: Mutex<Option<Box<dyn TimerHandle>>>,
    /// Bumped every time the session is cleared
    epoch: AtomicU64,
    scheduler: Arc<dyn Scheduler>,
    audit: AuditLog,
    me: Weak<SessionManager>,
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    config: SessionConfig,
    store: Option<TokenStore>,
    scheduler: Option<Arc<dyn Scheduler>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl SessionManagerBuilder {
    pub fn token_store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Arc<SessionManager>> {
        let config = self.config;
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("securet-flow"))
            .build()?;

        let store = self
            .store
            .unwrap_or_else(|| TokenStore::for_origin(&config.api_base));
        let scheduler = self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler));
        let audit = self.audit_sink.map(AuditLog::new).unwrap_or_default();

        Ok(Arc::new_cyclic(|me| SessionManager {
            config,
            http,
            store,
            user: RwLock::new(None),
            refresh_timer: Mutex::new(None),
            epoch: AtomicU64::new(0),
            scheduler,
            audit,
            me: me.clone(),
        }))
    }
}

impl SessionManager {
    /// Create a session manager with default storage, scheduler and audit sink
    pub fn new(config: SessionConfig) -> Result<Arc<Self>> {
        Self::builder(config).build()
    }

    pub fn builder(config: SessionConfig) -> SessionManagerBuilder {
        SessionManagerBuilder {
            config,
            store: None,
            scheduler: None,
            audit_sink: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Rebuild the in-memory session from storage.
    ///
    /// Returns `true` when both a token and a user were found. A half-present
    /// session is cleared.
    pub fn restore(&self) -> bool {
        match (self.store.access_token(), self.store.load_user()) {
            (Some(_), Some(user)) => {
                debug!(user_id = %user.id, "Restored stored session");
                *self.user_write() = Some(user);
                self.schedule_refresh();
                true
            }
            (None, None) => false,
            _ => {
                warn!("Discarding incomplete stored session");
                self.clear_session();
                false
            }
        }
    }

    /// Authenticate with email and password
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        self.audit
            .emit(AuthEvent::LoginAttempt, None, json!({ "email": email }));

        let url = self.config.endpoint(endpoints::LOGIN)?;
        let response = match self
            .http
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.audit.emit(
                    AuthEvent::LoginFailed,
                    None,
                    json!({ "email": email, "reason": e.to_string() }),
                );
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.audit.emit(
                AuthEvent::LoginFailed,
                None,
                json!({ "email": email, "status": status.as_u16() }),
            );
            return Err(SfAuthError::Authentication);
        }

        let login: LoginResponse = match response.json().await {
            Ok(login) => login,
            Err(e) => {
                self.audit.emit(
                    AuthEvent::LoginFailed,
                    None,
                    json!({ "email": email, "reason": "malformed login response" }),
                );
                return Err(SfAuthError::InvalidResponse(e.to_string()));
            }
        };

        self.establish(&login.token, login.user.clone())?;
        self.audit.emit(
            AuthEvent::LoginSuccess,
            Some(&login.user.id),
            json!({ "email": login.user.email, "role": login.user.role }),
        );

        Ok(login)
    }

    /// End the session.
    ///
    /// The logout endpoint is called best-effort; local state is cleared
    /// whatever it answers, so this never fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let user_id = self.current_user().map(|u| u.id);

        if let Some(header) = self.auth_header() {
            match self.config.endpoint(endpoints::LOGOUT) {
                Ok(url) => match self.http.post(url).header(AUTHORIZATION, header).send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!("Logout acknowledged by server");
                    }
                    Ok(response) => {
                        warn!("Logout endpoint returned {}, clearing session anyway", response.status());
                    }
                    Err(e) => {
                        warn!("Logout request failed ({}), clearing session anyway", e);
                    }
                },
                Err(e) => warn!("Invalid logout endpoint: {}", e),
            }
        }

        self.clear_session();
        self.audit
            .emit(AuthEvent::LogoutSuccess, user_id.as_deref(), json!({}));
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// Fails only with [`SfAuthError::NoRefreshToken`], after dropping any user
    /// record that outlived its tokens. Any other failure ends the session and
    /// yields `Ok(None)`. A refresh that completes after the session was
    /// cleared (for example by [`logout`](Self::logout)) is discarded and also
    /// yields `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn refresh_token(&self) -> Result<Option<AuthToken>> {
        let Some(refresh_token) = self.store.refresh_token() else {
            if self.user_read().is_some() || self.store.load_user().is_some() {
                debug!("Refresh token gone, clearing stale user record");
                self.clear_session();
            }
            return Err(SfAuthError::NoRefreshToken);
        };
        let user_id = self.current_user().map(|u| u.id);
        let epoch = self.epoch.load(Ordering::SeqCst);

        let exchanged = self.exchange_refresh_token(&refresh_token).await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Session ended while refreshing, discarding the new token");
            return Ok(None);
        }

        let outcome = match exchanged {
            Ok((token, refreshed_user)) => match refreshed_user.or_else(|| self.current_user()) {
                Some(user) => self.establish(&token, user).map(|_| token),
                None => Err(SfAuthError::RefreshFailed("no user record for session".to_string())),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(token) => {
                self.audit.emit(
                    AuthEvent::TokenRefreshed,
                    user_id.as_deref(),
                    json!({ "expires_in": token.expires_in }),
                );
                Ok(Some(token))
            }
            Err(e) => {
                self.audit.emit(
                    AuthEvent::TokenRefreshFailed,
                    user_id.as_deref(),
                    json!({ "reason": e.to_string() }),
                );
                self.clear_session();
                Ok(None)
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<(AuthToken, Option<User>)> {
        let url = self.config.endpoint(endpoints::REFRESH)?;
        let response = self
            .http
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| SfAuthError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SfAuthError::RefreshFailed(format!("HTTP {}", status.as_u16())));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SfAuthError::RefreshFailed(e.to_string()))?;
        Ok(refreshed.into_parts())
    }

    /// Fetch the current user's profile and replace the stored record
    #[instrument(skip(self))]
    pub async fn fetch_profile(&self) -> Result<User> {
        let header = self.auth_header().ok_or(SfAuthError::Authentication)?;
        let url = self.config.endpoint(endpoints::PROFILE)?;
        let response = self.http.get(url).header(AUTHORIZATION, header).send().await?;

        let user: User = read_json(response).await?;
        self.replace_user(user.clone())?;
        Ok(user)
    }

    /// Send a partial profile update to the server and store its answer
    #[instrument(skip(self))]
    pub async fn update_profile(&self, update: &UserUpdate) -> Result<User> {
        let header = self.auth_header().ok_or(SfAuthError::Authentication)?;
        let url = self.config.endpoint(endpoints::PROFILE)?;
        let response = self
            .http
            .put(url)
            .header(AUTHORIZATION, header)
            .json(update)
            .send()
            .await?;

        let user: User = read_json(response).await?;
        self.replace_user(user.clone())?;
        Ok(user)
    }

    /// Shallow-merge `update` into the stored user and persist it.
    ///
    /// Returns `None` when there is no user to update.
    pub fn update_user(&self, update: &UserUpdate) -> Result<Option<User>> {
        let Some(mut merged) = self.current_user() else {
            return Ok(None);
        };
        if update.is_empty() {
            return Ok(Some(merged));
        }

        merged.merge(update);
        self.store.save_user(&merged)?;
        *self.user_write() = Some(merged.clone());
        self.audit.emit(
            AuthEvent::UserUpdated,
            Some(&merged.id),
            serde_json::to_value(update).unwrap_or_default(),
        );
        Ok(Some(merged))
    }

    pub fn current_user(&self) -> Option<User> {
        self.user_read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.access_token().is_some() && self.user_read().is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.user_read()
            .as_ref()
            .is_some_and(|u| u.has_permission(permission))
    }

    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        self.user_read()
            .as_ref()
            .is_some_and(|u| permissions.iter().any(|p| u.has_permission(p)))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user_read().as_ref().is_some_and(|u| u.role == role)
    }

    /// `Bearer <access token>` when a token is stored
    pub fn auth_header(&self) -> Option<String> {
        self.store
            .access_token()
            .map(|token| format!("Bearer {}", token))
    }

    /// Arm the proactive refresh timer, disarming any previous one first
    pub fn schedule_refresh(&self) {
        let me = self.me.clone();
        let task: ScheduledTask = Box::pin(async move {
            let Some(manager) = me.upgrade() else {
                return;
            };
            match manager.refresh_token().await {
                Ok(Some(_)) => debug!("Proactive token refresh succeeded"),
                Ok(None) => debug!("Proactive token refresh ended the session"),
                Err(e) => debug!("Proactive token refresh stopped: {}", e),
            }
        });

        let mut timer = self.timer_lock();
        if let Some(previous) = timer.take() {
            previous.cancel();
        }
        *timer = Some(self.scheduler.schedule(self.config.refresh_delay, task));
    }

    /// Disarm the proactive refresh timer if one is armed
    pub fn cancel_refresh(&self) {
        if let Some(timer) = self.timer_lock().take() {
            timer.cancel();
        }
    }

    fn establish(&self, token: &AuthToken, user: User) -> Result<()> {
        let persisted = self
            .store
            .set_token(token)
            .and_then(|_| self.store.save_user(&user));
        if let Err(e) = persisted {
            self.clear_session();
            return Err(e);
        }

        *self.user_write() = Some(user);
        self.schedule_refresh();
        Ok(())
    }

    fn replace_user(&self, user: User) -> Result<()> {
        self.store.save_user(&user)?;
        let user_id = user.id.clone();
        *self.user_write() = Some(user);
        self.audit
            .emit(AuthEvent::UserUpdated, Some(&user_id), json!({ "source": "server" }));
        Ok(())
    }

    /// Forget everything local: timer, stored tokens, stored and in-memory user
    fn clear_session(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_refresh();
        self.store.clear();
        *self.user_write() = None;
        self.audit.emit(AuthEvent::AuthDataCleared, None, json!({}));
    }

    fn user_read(&self) -> RwLockReadGuard<'_, Option<User>> {
        self.user.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_write(&self) -> RwLockWriteGuard<'_, Option<User>> {
        self.user.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn timer_lock(&self) -> MutexGuard<'_, Option<Box<dyn TimerHandle>>> {
        self.refresh_timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthHeaderProvider for SessionManager {
    fn auth_header(&self) -> Option<String> {
        SessionManager::auth_header(self)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("api_base", &self.config.api_base.as_str())
            .field("store", &self.store)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SfAuthError::from_response_body(status, &body));
    }
    response
        .json()
        .await
        .map_err(|e| SfAuthError::InvalidResponse(e.to_string()))
}
