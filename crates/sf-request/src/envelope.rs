use serde::{Deserialize, Serialize};

/// Page metadata attached to list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }
}

/// Envelope some dashboard endpoints wrap their payload in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

fn none<T>() -> Option<T> {
    None
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload, or the most specific failure text the envelope carries
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error
                .or(self.message)
                .unwrap_or_else(|| "Request failed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Scan {
        id: String,
        status: String,
    }

    #[test]
    fn test_paginated_envelope() {
        let body = json!({
            "success": true,
            "data": [{"id": "scan-1", "status": "running"}],
            "pagination": {"page": 1, "limit": 20, "total": 41, "pages": 3}
        });

        let response: ApiResponse<Vec<Scan>> = serde_json::from_value(body).unwrap();
        let pagination = response.pagination.unwrap();
        assert!(pagination.has_next());
        assert_eq!(pagination.total, 41);

        let scans = response.into_result().unwrap().unwrap();
        assert_eq!(scans[0].id, "scan-1");
    }

    #[test]
    fn test_failed_envelope_prefers_error() {
        let body = json!({
            "success": false,
            "message": "Validation failed",
            "error": "target must be a hostname"
        });

        let response: ApiResponse<Scan> = serde_json::from_value(body).unwrap();
        assert_eq!(response.into_result().unwrap_err(), "target must be a hostname");
    }

    #[test]
    fn test_failed_envelope_without_text() {
        let response: ApiResponse<Scan> =
            serde_json::from_value(json!({"success": false})).unwrap();
        assert_eq!(response.into_result().unwrap_err(), "Request failed");
    }
}
