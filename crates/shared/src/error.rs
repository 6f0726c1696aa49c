use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 409 | 422 => Self::Validation,
            429 => Self::RateLimited,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

/// Error body returned by the service. Only `message` is relied upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, alias = "error")]
    pub message: String,
}

impl ApiError {
    /// Parses a response body, keeping non-JSON bodies as the message.
    pub fn from_body(body: &str) -> Option<Self> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<ApiError>(trimmed) {
            Ok(parsed) => Some(parsed),
            Err(_) => Some(Self {
                code: None,
                message: trimmed.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_error_body() {
        let parsed = ApiError::from_body(r#"{"success":false,"message":"Invalid credentials"}"#)
            .expect("payload");
        assert_eq!(parsed.message, "Invalid credentials");
        assert_eq!(parsed.code, None);
    }

    #[test]
    fn keeps_plain_text_body_as_message() {
        let parsed = ApiError::from_body("upstream timed out").expect("payload");
        assert_eq!(parsed.message, "upstream timed out");
    }

    #[test]
    fn empty_body_has_no_payload() {
        assert!(ApiError::from_body("  ").is_none());
    }

    #[test]
    fn maps_status_codes() {
        assert_eq!(ErrorCode::from_status(401), ErrorCode::Unauthorized);
        assert_eq!(ErrorCode::from_status(422), ErrorCode::Validation);
        assert_eq!(ErrorCode::from_status(503), ErrorCode::Internal);
        assert_eq!(ErrorCode::from_status(418), ErrorCode::Unknown);
    }
}
