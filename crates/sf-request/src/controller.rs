use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RequestOptions;
use crate::dispatcher::RequestDispatcher;
use crate::errors::{RequestError, Result};

/// Observable state of a controller
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub loading: bool,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl<T> RequestState<T> {
    pub fn status(&self) -> RequestStatus {
        if self.loading {
            RequestStatus::Loading
        } else if self.error.is_some() {
            RequestStatus::Error
        } else if self.data.is_some() {
            RequestStatus::Success
        } else {
            RequestStatus::Idle
        }
    }
}

type SuccessCallback<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorCallback = Box<dyn FnOnce(&RequestError) + Send>;

/// Hooks run once the outcome of a current call has been applied
pub struct Callbacks<T> {
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> Callbacks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&RequestError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

struct PendingCall {
    id: u64,
    token: CancellationToken,
    started_at: Instant,
}

/// Tracks `{data, error, loading}` for one logical request.
///
/// Starting a call cancels the one in flight, and only the most recently
/// started call may write to the state.
pub struct RequestController<T> {
    state: watch::Sender<RequestState<T>>,
    pending: Mutex<Option<PendingCall>>,
    next_id: AtomicU64,
}

impl<T> Default for RequestController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestController<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            state,
            pending: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn status(&self) -> RequestStatus {
        self.state.borrow().status()
    }

    /// Abort the call in flight, if any. Data and error are left untouched.
    pub fn cancel(&self) {
        if let Some(call) = self.pending_lock().take() {
            debug!(call = call.id, "Cancelling request");
            call.token.cancel();
        }
        self.state.send_modify(|state| state.loading = false);
    }

    /// Clear data and error. An in-flight call keeps running.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            state.data = None;
            state.error = None;
            state.loading = false;
        });
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut pending = self.pending_lock();
        if let Some(previous) = pending.take() {
            debug!(call = previous.id, "Superseding request in flight");
            previous.token.cancel();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *pending = Some(PendingCall {
            id,
            token: token.clone(),
            started_at: Instant::now(),
        });

        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        (id, token)
    }

    /// Clear the pending slot if `id` still owns it
    fn settle(&self, id: u64) -> bool {
        let mut pending = self.pending_lock();
        let current = pending
            .as_ref()
            .is_some_and(|call| call.id == id && !call.token.is_cancelled());
        if !current {
            return false;
        }

        if let Some(call) = pending.take() {
            debug!(
                call = id,
                elapsed_ms = call.started_at.elapsed().as_millis() as u64,
                "Request settled"
            );
        }
        true
    }

    fn pending_lock(&self) -> MutexGuard<'_, Option<PendingCall>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> RequestController<T> {
    pub fn state(&self) -> RequestState<T> {
        self.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }

    /// Run `request_fn` as the current call.
    ///
    /// `request_fn` receives the cancellation token of this call. When a
    /// later call starts (or [`cancel`](Self::cancel) is invoked) first, this
    /// call resolves to [`RequestError::Cancelled`] and its outcome is
    /// never written to the state nor passed to the callbacks.
    pub async fn execute<F, Fut>(&self, request_fn: F, callbacks: Callbacks<T>) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (id, token) = self.begin();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RequestError::Cancelled),
            result = request_fn(token.clone()) => result,
        };

        if !self.settle(id) {
            debug!(call = id, "Dropping result of superseded request");
            return Err(RequestError::Cancelled);
        }

        match &result {
            Ok(data) => {
                self.state.send_modify(|state| {
                    state.data = Some(data.clone());
                    state.error = None;
                    state.loading = false;
                });
                if let Some(on_success) = callbacks.on_success {
                    on_success(data);
                }
            }
            Err(e) => {
                self.state.send_modify(|state| {
                    state.error = Some(e.to_string());
                    state.loading = false;
                });
                if let Some(on_error) = callbacks.on_error {
                    on_error(e);
                }
            }
        }

        result
    }
}

impl<T: DeserializeOwned + Clone> RequestController<T> {
    /// Execute a dispatcher call as the current call
    pub async fn fetch(
        &self,
        dispatcher: &RequestDispatcher,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.execute(
            |token| async move {
                dispatcher
                    .request_with_cancel(method, path, options, &token)
                    .await
            },
            Callbacks::default(),
        )
        .await
    }

    pub async fn get(&self, dispatcher: &RequestDispatcher, path: &str) -> Result<T> {
        self.fetch(dispatcher, Method::GET, path, RequestOptions::default())
            .await
    }
}
