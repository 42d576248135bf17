//! Request and response values passed through the executor.

use std::time::Duration;

use log::error;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::config::MIN_TIMEOUT;
use crate::error::{ApiError, Result};

/// HTTP verbs supported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request payload.
///
/// Every variant owns its data so an attempt can be replayed verbatim.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(UploadForm),
}

/// One field of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Multipart form kept as plain bytes.
///
/// The transport encodes a fresh form (and boundary) for every attempt, so
/// retrying an upload never reads from a consumed stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadForm {
    parts: Vec<UploadPart>,
}

impl UploadForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(UploadPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(UploadPart::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        });
        self
    }

    pub fn parts(&self) -> &[UploadPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Check every declared content type parses as a MIME type.
    pub fn validate(&self) -> Result<()> {
        for part in &self.parts {
            if let UploadPart::File {
                name,
                content_type: Some(content_type),
                ..
            } = part
            {
                reqwest::multipart::Part::bytes(Vec::new())
                    .mime_str(content_type)
                    .map_err(|_| {
                        ApiError::invalid_request(format!(
                            "Invalid content type '{}' for upload field {}",
                            content_type, name
                        ))
                    })?;
            }
        }
        Ok(())
    }
}

/// Per-call overrides on top of [`crate::ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(MIN_TIMEOUT));
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// One caller-intended HTTP operation, as seen by a single attempt.
///
/// Attempts never mutate a request in place; [`LogicalRequest::next_attempt`]
/// derives the next one with one less retry in the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: RequestBody,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub remaining_retries: u32,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Sent as `X-Request-Id`; identical across attempts of one call.
    pub request_id: String,
}

impl LogicalRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, timeout: Duration, retries: u32) -> Self {
        Self {
            method,
            url: url.into(),
            body: RequestBody::Empty,
            headers: Vec::new(),
            timeout: timeout.max(MIN_TIMEOUT),
            remaining_retries: retries,
            attempt: 1,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn is_upload(&self) -> bool {
        matches!(self.body, RequestBody::Multipart(_))
    }

    pub fn next_attempt(&self) -> Self {
        debug_assert!(self.remaining_retries > 0, "retry budget exhausted");
        Self {
            remaining_retries: self.remaining_retries.saturating_sub(1),
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Completed call: decoded JSON body, status and response headers.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub data: Value,
    pub status: u16,
    pub headers: HeaderMap,
}

impl ApiResponse {
    /// Decode a 2xx body. Empty bodies decode to `null`.
    pub fn from_parts(status: u16, headers: HeaderMap, body: &[u8]) -> Result<Self> {
        let data = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(body).map_err(|e| {
                error!("[Api] Failed to deserialize response ({}): {}", status, e);
                ApiError::decode(status, format!("Failed to parse response: {}", e))
            })?
        };
        Ok(Self {
            data,
            status,
            headers,
        })
    }

    /// Deserialize `data` into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            ApiError::decode(self.status, format!("Failed to parse response: {}", e))
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
