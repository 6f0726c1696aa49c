use reqwest::StatusCode;
use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    #[error("login rejected: {message}")]
    Credentials { message: String },
    #[error("unauthorized ({status})")]
    Unauthorized {
        status: StatusCode,
        payload: Option<ApiError>,
    },
    #[error("request failed with status {status}{}", describe_payload(.payload))]
    Status {
        status: StatusCode,
        payload: Option<ApiError>,
    },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("invalid configuration: {0}")]
    Config(String),
}

fn describe_payload(payload: &Option<ApiError>) -> String {
    match payload {
        Some(payload) if !payload.message.is_empty() => format!(": {}", payload.message),
        _ => String::new(),
    }
}

impl ClientError {
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let payload = ApiError::from_body(body);
        if status == StatusCode::UNAUTHORIZED {
            ClientError::Unauthorized { status, payload }
        } else {
            ClientError::Status { status, payload }
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Unauthorized { status, .. } | ClientError::Status { status, .. } => {
                Some(*status)
            }
            ClientError::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&ApiError> {
        match self {
            ClientError::Unauthorized { payload, .. } | ClientError::Status { payload, .. } => {
                payload.as_ref()
            }
            _ => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Validation(_) => ErrorCode::Validation,
            ClientError::Credentials { .. }
            | ClientError::Unauthorized { .. }
            | ClientError::NotAuthenticated => ErrorCode::Unauthorized,
            ClientError::Status { status, payload } => payload
                .as_ref()
                .and_then(|p| p.code)
                .unwrap_or_else(|| ErrorCode::from_status(status.as_u16())),
            ClientError::Transport(_) | ClientError::Decode(_) | ClientError::Config(_) => {
                ErrorCode::Internal
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            ClientError::Unauthorized { .. } | ClientError::NotAuthenticated
        )
    }
}
