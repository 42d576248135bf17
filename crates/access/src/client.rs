//! Request executor.
//!
//! One logical call runs as an explicit loop of attempts. Every attempt
//! rebuilds its headers (so a refreshed token is picked up), runs the
//! transport under the request timeout, and hands the classified
//! [`Outcome`] to [`decide`]. Retry edges spend one unit of
//! `remaining_retries`, so the loop is bounded by `retries + 1` attempts.

use std::sync::Arc;

use appwire_core::{ConnectivityProvider, SessionListener};
use log::{debug, warn};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE,
};
use serde::Serialize;
use tokio::time::{sleep, timeout};

use crate::auth::TokenProvider;
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::retry::{decide, Outcome, RetryDecision};
use crate::telemetry::RetryTelemetry;
use crate::transport::{ReqwestTransport, Transport, TransportError, TransportRequest};
use crate::types::{
    ApiResponse, HttpMethod, LogicalRequest, RequestBody, RequestOptions, UploadForm,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_LOG_BODY_CHARS: usize = 512;

/// Authenticated JSON API client.
///
/// Collaborators are injected; cloning shares them.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    connectivity: Arc<dyn ConnectivityProvider>,
    session: Arc<dyn SessionListener>,
    telemetry: Arc<RetryTelemetry>,
}

impl ApiClient {
    /// Create a client on the `reqwest` transport with its own telemetry counter.
    pub fn new(
        config: ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        connectivity: Arc<dyn ConnectivityProvider>,
        session: Arc<dyn SessionListener>,
    ) -> Self {
        Self {
            config,
            transport: Arc::new(ReqwestTransport::new()),
            tokens,
            connectivity,
            session,
            telemetry: Arc::new(RetryTelemetry::new()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Share a telemetry counter with other clients.
    pub fn with_telemetry(mut self, telemetry: Arc<RetryTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<RetryTelemetry> {
        Arc::clone(&self.telemetry)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verbs
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.send(HttpMethod::Get, path, RequestBody::Empty, options)
            .await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        self.send(HttpMethod::Post, path, json_body(body)?, options)
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        self.send(HttpMethod::Put, path, json_body(body)?, options)
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        self.send(HttpMethod::Patch, path, json_body(body)?, options)
            .await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.send(HttpMethod::Delete, path, RequestBody::Empty, options)
            .await
    }

    /// POST a multipart form. The form is replayed as-is on retry.
    pub async fn upload(
        &self,
        path: &str,
        form: UploadForm,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        self.send(HttpMethod::Post, path, RequestBody::Multipart(form), options)
            .await
    }

    /// Build the logical request for a verb call without sending it.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> LogicalRequest {
        let mut url = self.config.resolve_url(path);
        if !options.query.is_empty() {
            let query = options
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{}{}{}", url, separator, query);
        }

        LogicalRequest::new(
            method,
            url,
            options.timeout.unwrap_or(self.config.timeout),
            options.retries.unwrap_or(self.config.retries),
        )
        .with_body(body)
        .with_headers(options.headers)
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        self.execute(self.request(method, path, body, options))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a logical request to its single terminal result.
    pub async fn execute(&self, request: LogicalRequest) -> Result<ApiResponse> {
        let policy = self.config.retry_policy();
        if let RequestBody::Multipart(form) = &request.body {
            form.validate()?;
        }
        let mut request = request;

        loop {
            if !self.connectivity.is_connected() {
                warn!(
                    "[Api] {} {} not sent: device is offline",
                    request.method.as_str(),
                    request.url
                );
                return Err(ApiError::connectivity());
            }

            let headers = self.build_headers(&request).await?;
            let outcome = self.send_attempt(&request, headers).await;

            let Some(decision) = decide(
                &outcome,
                request.remaining_retries,
                request.attempt,
                &policy,
            ) else {
                self.telemetry.reset();
                return outcome.into_response();
            };

            match decision {
                RetryDecision::Retry(delay) => {
                    let retries = if matches!(outcome, Outcome::HttpFailure { .. }) {
                        self.telemetry.record_retry()
                    } else {
                        self.telemetry.retry_count()
                    };
                    debug!(
                        "[Api] {} {} retrying in {:?} (attempt {}, {} left, telemetry={})",
                        request.method.as_str(),
                        request.url,
                        delay,
                        request.attempt + 1,
                        request.remaining_retries - 1,
                        retries
                    );
                    sleep(delay).await;
                    request = request.next_attempt();
                }
                RetryDecision::RefreshThenRetry => {
                    debug!(
                        "[Api] {} {} unauthorized, refreshing token",
                        request.method.as_str(),
                        request.url
                    );
                    if !self.tokens.refresh_token().await {
                        warn!("[Api] Token refresh failed, invalidating session");
                        self.session.on_session_invalidated();
                        return Err(outcome
                            .final_error()
                            .unwrap_or_else(|| ApiError::session_expired(401, b"")));
                    }
                    request = request.next_attempt();
                }
                RetryDecision::Fail(error) => {
                    if error.is_auth() {
                        warn!("[Api] Credentials rejected, invalidating session");
                        self.session.on_session_invalidated();
                    }
                    debug!(
                        "[Api] {} {} failed after {} attempt(s): {}",
                        request.method.as_str(),
                        request.url,
                        request.attempt,
                        error
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Defaults, then caller headers, then request ID and bearer token.
    async fn build_headers(&self, request: &LogicalRequest) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::invalid_request(format!("Invalid header name {}", name)))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                ApiError::invalid_request(format!("Invalid value for header {}", name))
            })?;
            headers.insert(name, value);
        }

        // The transport writes the multipart boundary itself.
        if request.is_upload() {
            headers.remove(CONTENT_TYPE);
        }

        let request_id = HeaderValue::from_str(&request.request_id)
            .map_err(|_| ApiError::invalid_request("Invalid request ID"))?;
        headers.insert(REQUEST_ID_HEADER, request_id);

        if let Some(token) = self.tokens.valid_token().await {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::invalid_request("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    async fn send_attempt(&self, request: &LogicalRequest, headers: HeaderMap) -> Outcome {
        let attempt = TransportRequest {
            method: request.method,
            url: request.url.clone(),
            headers,
            body: request.body.clone(),
        };

        let result = match timeout(request.timeout, self.transport.send(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "Request timed out after {}ms",
                request.timeout.as_millis()
            ))),
        };

        let outcome = Outcome::classify(result);
        log_outcome(request, &outcome);
        outcome
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(|e| ApiError::invalid_request(format!("Failed to serialize request body: {}", e)))
}

fn log_outcome(request: &LogicalRequest, outcome: &Outcome) {
    match outcome {
        Outcome::Success { status, .. } => {
            debug!(
                "[Api] {} {} -> {}",
                request.method.as_str(),
                request.url,
                status
            );
        }
        Outcome::HttpFailure { status, body, .. } => {
            let body = String::from_utf8_lossy(body);
            let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
            if body.chars().count() > MAX_LOG_BODY_CHARS {
                preview.push_str("...");
            }
            debug!(
                "[Api] {} {} -> {}: {}",
                request.method.as_str(),
                request.url,
                status,
                preview
            );
        }
        Outcome::TransportFailure { kind, message } => {
            debug!(
                "[Api] {} {} -> {:?}: {}",
                request.method.as_str(),
                request.url,
                kind,
                message
            );
        }
    }
}
