use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad failure category, used for retry decisions and user-facing handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing or malformed input, caught before any network call.
    Validation,
    /// Invalid credentials or any 401/403 from the pipeline.
    Authentication,
    /// The requested entity does not exist.
    NotFound,
    /// Timeout or transport failure.
    Network,
    Unexpected,
}

/// The single error shape every backend call resolves to.
///
/// Serializes as `{message, code?, statusCode?, errors?}`.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct ApiError {
    #[serde(skip)]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

/// Error body returned by the backend: `{message, code?, errors?}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
    errors: Option<BTreeMap<String, Vec<String>>>,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

const DEFAULT_MESSAGE: &str = "An unexpected error occurred";

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            status_code: None,
            errors: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message).with_code("VALIDATION_ERROR")
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message).with_code("AUTHENTICATION_ERROR")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message).with_code("NOT_FOUND")
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message).with_code("NETWORK_ERROR")
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors
            .get_or_insert_with(BTreeMap::new)
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == Some(401)
    }

    /// Transient failures are worth retrying; the rest will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Unexpected)
    }

    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    fn kind_for_status(status: u16) -> ErrorKind {
        match status {
            400 | 422 => ErrorKind::Validation,
            401 | 403 => ErrorKind::Authentication,
            404 => ErrorKind::NotFound,
            408 | 502 | 503 | 504 => ErrorKind::Network,
            _ => ErrorKind::Unexpected,
        }
    }

    /// Normalize a non-success HTTP response.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .message
            .filter(|m| !m.is_empty())
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && !trimmed.starts_with('{'))
                    .then(|| Self::truncate_body(trimmed))
            })
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        Self {
            kind: Self::kind_for_status(status.as_u16()),
            message,
            code: parsed.code,
            status_code: Some(status.as_u16()),
            errors: parsed.errors,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let mut api_error = if err.is_timeout() {
            ApiError::network("Request timed out").with_code("TIMEOUT")
        } else if err.is_decode() {
            ApiError::unexpected(format!("Invalid response: {}", err)).with_code("INVALID_RESPONSE")
        } else if err.is_connect() || err.is_request() {
            ApiError::network(format!("Network error: {}", err))
        } else if err.is_builder() {
            ApiError::unexpected(format!("Invalid request: {}", err))
        } else {
            ApiError::unexpected(err.to_string())
        };
        api_error.status_code = status;
        api_error
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::unexpected(format!("Invalid response: {}", err)).with_code("INVALID_RESPONSE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_uses_body_shape() {
        let body = r#"{"message":"Email taken","code":"DUPLICATE","errors":{"email":["already registered"]}}"#;
        let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "Email taken");
        assert_eq!(err.code.as_deref(), Some("DUPLICATE"));
        assert_eq!(err.status_code, Some(422));
        assert_eq!(err.errors.unwrap()["email"], vec!["already registered".to_string()]);
    }

    #[test]
    fn test_from_status_falls_back_to_reason() {
        let err = ApiError::from_status(StatusCode::NOT_FOUND, "");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Not Found");

        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "{}");
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert!(err.is_unauthorized());
        assert_eq!(err.message, "Unauthorized");
    }

    #[test]
    fn test_from_status_plain_text_body_is_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert_eq!(err.kind, ErrorKind::Unexpected);
        assert!(err.message.contains("truncated"));
    }

    #[test]
    fn test_serialized_shape() {
        let err = ApiError::authentication("Invalid credentials").with_status(401);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["message"], "Invalid credentials");
        assert_eq!(json["statusCode"], 401);
        assert!(json.get("kind").is_none());
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ApiError::network("down").is_transient());
        assert!(ApiError::unexpected("boom").is_transient());
        assert!(!ApiError::validation("bad").is_transient());
        assert!(!ApiError::not_found("gone").is_transient());
    }
}
