use thiserror::Error;

/// Session and token storage error types
#[derive(Error, Debug)]
pub enum SfAuthError {
    #[error("Invalid credentials")]
    Authentication,

    #[error("No refresh token available - session already ended")]
    NoRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {message}")]
    Http {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SfAuthError {
    /// Build an `Http` error from a status and a raw response body.
    ///
    /// Uses the server-provided message when the body is a JSON object
    /// carrying one, otherwise falls back to `HTTP <status>`.
    pub fn from_response_body(status: reqwest::StatusCode, body: &str) -> Self {
        let message = server_message(body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Self::Http { status, message }
    }
}

/// Extract a human readable message from a JSON error body.
///
/// Looks at `message`, then `error`, then `detail`.
pub fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|field| value.get(field).and_then(|v| v.as_str()))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

pub type Result<T> = std::result::Result<T, SfAuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_server_message_prefers_message_field() {
        let body = r#"{"message":"bad input","error":"other","detail":"x"}"#;
        assert_eq!(server_message(body).as_deref(), Some("bad input"));
    }

    #[test]
    fn test_server_message_falls_back_to_detail() {
        assert_eq!(
            server_message(r#"{"detail":"Incorrect email or password"}"#).as_deref(),
            Some("Incorrect email or password")
        );
    }

    #[test]
    fn test_http_error_without_body_message() {
        let err = SfAuthError::from_response_body(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        match err {
            SfAuthError::Http { status, message } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "HTTP 502");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
