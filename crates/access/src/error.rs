//! Error types for the access layer.
//!
//! Every failure path of a logical request ends in [`ApiError`]. Callers that
//! only care about the `{status?, data?, message}` shape use
//! [`ApiError::payload`].

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportErrorKind;

/// Result type alias for access layer operations.
pub type Result<T> = std::result::Result<T, ApiError>;

pub const OFFLINE_MESSAGE: &str = "No internet connection. Please check your network and try again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please sign in again.";

/// Terminal failure of a logical request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Device offline; no attempt was made.
    #[error("{message}")]
    Connectivity { message: String },

    /// The request was sent (or started) but no HTTP response came back.
    #[error("{message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Http {
        status: u16,
        data: Value,
        message: String,
    },

    /// Credentials were rejected and could not be renewed.
    #[error("{message}")]
    Auth {
        status: u16,
        data: Value,
        message: String,
    },

    /// A 2xx response whose body could not be decoded.
    #[error("{message}")]
    Decode { status: u16, message: String },

    /// The request could not be built (bad header, unserializable body).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Uniform failure shape handed to UI layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub message: String,
}

impl ApiError {
    pub fn connectivity() -> Self {
        Self::Connectivity {
            message: OFFLINE_MESSAGE.to_string(),
        }
    }

    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Build an HTTP failure from a raw error body.
    ///
    /// The body is kept as JSON when it parses, otherwise replaced by `{}`.
    /// A string `message` field in the body wins over the synthesized text.
    pub fn from_http_failure(status: u16, body: &[u8]) -> Self {
        let data = parse_error_body(body);
        let message = server_message(&data)
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        Self::Http {
            status,
            data,
            message,
        }
    }

    /// Authentication failure carrying whatever body the server sent.
    ///
    /// The server's `message` wins; otherwise the generic session text.
    pub fn session_expired(status: u16, body: &[u8]) -> Self {
        let data = parse_error_body(body);
        let message =
            server_message(&data).unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string());
        Self::Auth {
            status,
            data,
            message,
        }
    }

    pub fn decode(status: u16, message: impl Into<String>) -> Self {
        Self::Decode {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status, absent for failures that never produced a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Auth { status, .. } | Self::Decode { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Parsed error body from the server, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Http { data, .. } | Self::Auth { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Connectivity { message }
            | Self::Transport { message, .. }
            | Self::Http { message, .. }
            | Self::Auth { message, .. }
            | Self::Decode { message, .. } => message,
            Self::InvalidRequest(message) => message,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            }
        )
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            status: self.status(),
            data: self.data().cloned(),
            message: self.message().to_string(),
        }
    }
}

fn parse_error_body(body: &[u8]) -> Value {
    serde_json::from_slice::<Value>(body).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn server_message(data: &Value) -> Option<String> {
    data.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
