//! Auth and security event log with sensitive-field redaction.
//!
//! Every session transition is reported as a named [`AuthEvent`]. Details are
//! passed through [`redact`] before they reach any sink, so a caller can hand
//! over request payloads without scrubbing them first.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Key fragments that mark a field as sensitive
pub const SENSITIVE_KEYS: &[&str] = &["password", "token", "secret", "key", "auth", "credential"];

pub const REDACTED: &str = "[REDACTED]";

/// Named session transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    LoginAttempt,
    LoginSuccess,
    LoginFailed,
    LogoutSuccess,
    TokenRefreshed,
    TokenRefreshFailed,
    AuthDataCleared,
    UserUpdated,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginAttempt => "login_attempt",
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::LogoutSuccess => "logout_success",
            Self::TokenRefreshed => "token_refreshed",
            Self::TokenRefreshFailed => "token_refresh_failed",
            Self::AuthDataCleared => "auth_data_cleared",
            Self::UserUpdated => "user_updated",
        }
    }

    /// Security events are failures worth a warning; the rest are routine
    pub fn kind(&self) -> EventKind {
        match self {
            Self::LoginFailed | Self::TokenRefreshFailed => EventKind::Security,
            _ => EventKind::Auth,
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Auth,
    Security,
}

/// A single recorded event, already redacted
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub event: AuthEvent,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Default sink: emits entries as `tracing` events on the `sf_auth::audit` target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        let user_id = entry.user_id.as_deref().unwrap_or("-");
        match entry.kind {
            EventKind::Security => tracing::warn!(
                target: "sf_auth::audit",
                event = %entry.event,
                user_id,
                details = %entry.details,
                "SECURITY EVENT: {}",
                entry.event
            ),
            EventKind::Auth => tracing::info!(
                target: "sf_auth::audit",
                event = %entry.event,
                user_id,
                details = %entry.details,
                "AUTH EVENT: {}",
                entry.event
            ),
        }
    }
}

/// Cheap handle used by the session layer to report events
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: AuthEvent, user_id: Option<&str>, details: Value) {
        let entry = AuditEntry {
            event,
            kind: event.kind(),
            user_id: user_id.map(str::to_string),
            details: redact(&details),
            timestamp: Utc::now(),
        };
        self.sink.record(&entry);
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuditLog")
    }
}

/// Replace the value of every field whose key looks sensitive.
///
/// Matching is a case-insensitive substring test against [`SENSITIVE_KEYS`],
/// applied recursively through objects and arrays.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let redacted = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact(inner)
                };
                out.insert(key.clone(), redacted);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|s| lower.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<AuditEntry>>);

    impl AuditSink for Recording {
        fn record(&self, entry: &AuditEntry) {
            self.0.lock().unwrap().push(entry.clone());
        }
    }

    #[test]
    fn test_redact_nested_fields() {
        let input = json!({
            "email": "a@b.com",
            "Password": "hunter2",
            "nested": { "refresh_token": "R1", "scope": "read" },
            "list": [{ "apiKey": "k" }, { "plain": 1 }]
        });

        let out = redact(&input);

        assert_eq!(out["email"], "a@b.com");
        assert_eq!(out["Password"], REDACTED);
        assert_eq!(out["nested"]["refresh_token"], REDACTED);
        assert_eq!(out["nested"]["scope"], "read");
        assert_eq!(out["list"][0]["apiKey"], REDACTED);
        assert_eq!(out["list"][1]["plain"], 1);
    }

    #[test]
    fn test_emit_redacts_before_sink() {
        let sink = Arc::new(Recording::default());
        let log = AuditLog::new(sink.clone());

        log.emit(
            AuthEvent::LoginFailed,
            None,
            json!({ "email": "a@b.com", "password": "pw" }),
        );

        let entries = sink.0.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EventKind::Security);
        assert_eq!(entries[0].details["password"], REDACTED);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(AuthEvent::TokenRefreshFailed.as_str(), "token_refresh_failed");
        assert_eq!(
            serde_json::to_value(AuthEvent::AuthDataCleared).unwrap(),
            json!("auth_data_cleared")
        );
    }
}
