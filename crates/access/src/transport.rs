//! Fetch-like transport seam and its `reqwest` implementation.
//!
//! The executor owns timeouts and retries; a [`Transport`] performs exactly
//! one round-trip per call and reports either a response (any status) or a
//! [`TransportError`].

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use thiserror::Error;

use crate::types::{HttpMethod, RequestBody, UploadForm, UploadPart};

/// Failure before an HTTP response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Network,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Abort,
            message: message.into(),
        }
    }
}

/// A fully built attempt: absolute URL, final headers, owned body.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`.
///
/// The client is built without its own timeout; the executor enforces the
/// per-request deadline by dropping the in-flight future.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .headers(request.headers);

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder.multipart(build_multipart(&form)?),
        };

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn build_multipart(form: &UploadForm) -> Result<Form, TransportError> {
    let mut multipart = Form::new();
    for part in form.parts() {
        multipart = match part {
            UploadPart::Text { name, value } => multipart.text(name.clone(), value.clone()),
            UploadPart::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                let mut file_part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(content_type) = content_type {
                    file_part = file_part.mime_str(content_type).map_err(|e| {
                        TransportError::abort(format!(
                            "Invalid upload content type {}: {}",
                            content_type, e
                        ))
                    })?;
                }
                multipart.part(name.clone(), file_part)
            }
        };
    }
    Ok(multipart)
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(err.to_string())
    } else {
        TransportError::network(err.to_string())
    }
}
