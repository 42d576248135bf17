//! Authenticated network access layer.
//!
//! [`ApiClient`] turns one logical HTTP call into either a decoded
//! [`ApiResponse`] or a classified [`ApiError`]. Each attempt checks
//! connectivity, merges the bearer token, and runs under a timeout. The
//! failure is then classified into an [`Outcome`] and a [`RetryDecision`]
//! picks between retrying, refreshing credentials and retrying, or giving up.
//!
//! Credentials come from a [`TokenProvider`]; the shipped [`TokenManager`]
//! guarantees that concurrent callers share a single in-flight refresh.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{
    HttpTokenRefresher, TokenError, TokenGrant, TokenManager, TokenProvider, TokenRefresher,
};
pub use client::ApiClient;
pub use config::{BackoffStrategy, ClientConfig};
pub use error::{ApiError, ErrorPayload, Result};
pub use retry::{decide, Outcome, RetryDecision, RetryPolicy};
pub use telemetry::RetryTelemetry;
pub use transport::{
    ReqwestTransport, Transport, TransportError, TransportErrorKind, TransportRequest,
    TransportResponse,
};
pub use types::{
    ApiResponse, HttpMethod, LogicalRequest, RequestBody, RequestOptions, UploadForm, UploadPart,
};
