//! Shared response types for the TikTok API client.

use serde::{Deserialize, Serialize};

/// Error object embedded in every v2 response envelope.
///
/// Successful responses carry `code = "ok"`; anything else is a request-level failure
/// even when the HTTP status is 200.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseError {
    /// Machine-readable error code; `"ok"` (or absent) on success.
    #[serde(default)]
    pub code: String,
    /// Human-readable description of the failure.
    #[serde(default)]
    pub message: String,
    /// Server-side request correlation id.
    #[serde(default)]
    pub log_id: String,
}

impl ResponseError {
    /// Whether this error object actually reports success.
    pub fn is_ok(&self) -> bool {
        self.code.is_empty() || self.code == "ok"
    }
}

/// Body TikTok attaches to non-2xx responses.
///
/// When `data.description` is present it is a far better message than the HTTP status
/// line, so the client substitutes it into the surfaced error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub data: ErrorData,
    #[serde(default)]
    pub message: String,
}

/// Detail block of an [`ErrorResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub captcha: String,
    #[serde(default)]
    pub desc_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub error_code: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_code_reports_success() {
        let error: ResponseError =
            serde_json::from_str(r#"{"code":"ok","message":"","log_id":"abc"}"#).unwrap();
        assert!(error.is_ok());
    }

    #[test]
    fn absent_error_object_defaults_to_success() {
        let error = ResponseError::default();
        assert!(error.is_ok());
    }

    #[test]
    fn partial_error_body_still_parses() {
        let error: ErrorResponse =
            serde_json::from_str(r#"{"data":{"description":"Access token is invalid"}}"#).unwrap();
        assert_eq!(error.data.description, "Access token is invalid");
        assert_eq!(error.data.error_code, 0);
    }
}
