use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Request lifecycle error types
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl RequestError {
    /// Build an `Http` error, preferring the server-provided message
    pub fn from_response_body(status: StatusCode, body: &str) -> Self {
        let message = sf_auth::errors::server_message(body)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Self::Http { status, message }
    }

    /// Transport failures and non-2xx answers are worth another attempt;
    /// deadlines and cancellations never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_timeout(),
            Self::Http { .. } => true,
            _ => false,
        }
    }

    /// Deadline exceeded (ours or the HTTP client's) or explicitly cancelled
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Cancelled => true,
            Self::Network(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display_is_server_message() {
        let err = RequestError::from_response_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"target unreachable"}"#,
        );
        assert_eq!(err.to_string(), "target unreachable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_http_error_display_falls_back_to_status() {
        let err = RequestError::from_response_body(StatusCode::NOT_FOUND, "");
        assert_eq!(err.to_string(), "HTTP 404");
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_timeouts_are_not_retryable() {
        assert!(!RequestError::Timeout(Duration::from_millis(50)).is_retryable());
        assert!(!RequestError::Cancelled.is_retryable());
        assert!(RequestError::Cancelled.is_timeout());
    }

    #[test]
    fn test_invalid_header_is_final() {
        let err = RequestError::InvalidHeader("authorization".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_timeout());
    }
}
