//! Outcome classification and retry policy.
//!
//! [`decide`] is a pure function: given what one attempt produced and how
//! much budget is left, it says what the executor does next. Every retry
//! edge requires `remaining_retries > 0`, and the executor spends one unit
//! per retry, so a logical call always terminates.

use std::time::Duration;

use log::debug;
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::config::BackoffStrategy;
use crate::error::{ApiError, Result};
use crate::transport::{TransportError, TransportErrorKind, TransportResponse};
use crate::types::ApiResponse;

const MAX_BACKOFF_EXPONENT: u32 = 8;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// What a single attempt produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success {
        status: u16,
        body: Vec<u8>,
        headers: HeaderMap,
    },
    HttpFailure {
        status: u16,
        body: Vec<u8>,
        headers: HeaderMap,
    },
    TransportFailure {
        kind: TransportErrorKind,
        message: String,
    },
}

impl Outcome {
    pub fn classify(result: std::result::Result<TransportResponse, TransportError>) -> Self {
        match result {
            Ok(response) if response.is_success() => Self::Success {
                status: response.status,
                body: response.body,
                headers: response.headers,
            },
            Ok(response) => Self::HttpFailure {
                status: response.status,
                body: response.body,
                headers: response.headers,
            },
            Err(err) => Self::TransportFailure {
                kind: err.kind,
                message: err.message,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } | Self::HttpFailure { status, .. } => Some(*status),
            Self::TransportFailure { .. } => None,
        }
    }

    /// The error a caller sees if this outcome ends the call.
    pub fn final_error(&self) -> Option<ApiError> {
        match self {
            Self::Success { .. } => None,
            Self::HttpFailure { status: 401, body, .. } => {
                Some(ApiError::session_expired(401, body))
            }
            Self::HttpFailure { status, body, .. } => {
                Some(ApiError::from_http_failure(*status, body))
            }
            Self::TransportFailure { kind, message } => {
                Some(ApiError::transport(*kind, message.clone()))
            }
        }
    }

    /// Terminal conversion: decoded response or the final error.
    pub fn into_response(self) -> Result<ApiResponse> {
        match self {
            Self::Success {
                status,
                body,
                headers,
            } => ApiResponse::from_parts(status, headers, &body),
            failure => Err(failure
                .final_error()
                .unwrap_or_else(|| ApiError::invalid_request("unclassified outcome"))),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Success { status, .. } | Self::HttpFailure { status, .. } => {
                format!("HTTP {}", status)
            }
            Self::TransportFailure { kind, message } => format!("{:?}: {}", kind, message),
        }
    }
}

/// Next step after a non-successful attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    RefreshThenRetry,
    Fail(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, `attempt` being the one that failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential { max } => {
                let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
                let base_ms = self.base_delay.as_millis() as u64;
                let max_ms = max.as_millis() as u64;
                let backoff = base_ms.saturating_mul(1_u64 << exp).min(max_ms);
                let jitter = rand::thread_rng().gen_range(0..=(backoff / 5).max(1));
                Duration::from_millis(backoff.saturating_add(jitter))
            }
        }
    }

    fn retry_after_cap(&self) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => MAX_RETRY_AFTER,
            BackoffStrategy::Exponential { max } => max,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

/// Decide what follows an attempt. `None` means the attempt succeeded.
pub fn decide(
    outcome: &Outcome,
    remaining_retries: u32,
    attempt: u32,
    policy: &RetryPolicy,
) -> Option<RetryDecision> {
    let can_retry = remaining_retries > 0;
    let decision = match outcome {
        Outcome::Success { .. } => return None,
        Outcome::HttpFailure { status: 401, .. } if can_retry => RetryDecision::RefreshThenRetry,
        Outcome::HttpFailure {
            status, headers, ..
        } if can_retry && is_retryable_status(*status) => {
            let delay = retry_after(*status, headers)
                .map(|d| d.min(policy.retry_after_cap()))
                .unwrap_or_else(|| policy.delay_for(attempt));
            RetryDecision::Retry(delay)
        }
        Outcome::TransportFailure { .. } if can_retry => {
            RetryDecision::Retry(policy.delay_for(attempt))
        }
        failure => match failure.final_error() {
            Some(error) => RetryDecision::Fail(error),
            None => return None,
        },
    };

    debug!(
        "[Retry] attempt {} -> {} (remaining={}): {:?}",
        attempt,
        outcome.describe(),
        remaining_retries,
        decision
    );
    Some(decision)
}

/// Server-requested delay on 429/503, integer seconds only.
fn retry_after(status: u16, headers: &HeaderMap) -> Option<Duration> {
    if !matches!(status, 429 | 503) {
        return None;
    }
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn fixed() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1000),
            backoff: BackoffStrategy::Fixed,
        }
    }

    fn http(status: u16, body: &str) -> Outcome {
        Outcome::HttpFailure {
            status,
            body: body.as_bytes().to_vec(),
            headers: HeaderMap::new(),
        }
    }

    fn transport(kind: TransportErrorKind, message: &str) -> Outcome {
        Outcome::TransportFailure {
            kind,
            message: message.to_string(),
        }
    }

    #[test]
    fn success_needs_no_decision() {
        let outcome = Outcome::Success {
            status: 200,
            body: b"{}".to_vec(),
            headers: HeaderMap::new(),
        };
        assert_eq!(decide(&outcome, 3, 1, &fixed()), None);
    }

    #[test]
    fn unauthorized_with_budget_refreshes() {
        assert_eq!(
            decide(&http(401, "{}"), 1, 1, &fixed()),
            Some(RetryDecision::RefreshThenRetry)
        );
    }

    #[test]
    fn unauthorized_without_budget_is_an_auth_failure() {
        let decision = decide(&http(401, r#"{"message":"jwt expired"}"#), 0, 4, &fixed());
        match decision {
            Some(RetryDecision::Fail(err)) => {
                assert!(err.is_auth());
                assert_eq!(err.status(), Some(401));
                assert_eq!(err.message(), "jwt expired");
            }
            other => panic!("expected auth failure, got {:?}", other),
        }
    }

    #[test]
    fn transient_statuses_retry_with_fixed_delay() {
        for status in [408, 429, 500, 502, 503, 504, 599] {
            assert_eq!(
                decide(&http(status, "{}"), 2, 1, &fixed()),
                Some(RetryDecision::Retry(Duration::from_millis(1000))),
                "status {}",
                status
            );
        }
    }

    #[test]
    fn client_errors_fail_immediately() {
        for status in [400, 403, 404, 409, 422] {
            match decide(&http(status, "{}"), 3, 1, &fixed()) {
                Some(RetryDecision::Fail(err)) => assert_eq!(err.status(), Some(status)),
                other => panic!("status {} gave {:?}", status, other),
            }
        }
    }

    #[test]
    fn exhausted_server_error_reports_last_status() {
        match decide(&http(503, "{}"), 0, 4, &fixed()) {
            Some(RetryDecision::Fail(err)) => {
                assert_eq!(err.status(), Some(503));
                assert_eq!(err.message(), "Request failed with status 503");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn transport_failures_retry_then_surface_message_verbatim() {
        for kind in [
            TransportErrorKind::Timeout,
            TransportErrorKind::Network,
            TransportErrorKind::Abort,
        ] {
            assert_eq!(
                decide(&transport(kind, "boom"), 1, 1, &fixed()),
                Some(RetryDecision::Retry(Duration::from_millis(1000)))
            );
        }

        match decide(
            &transport(TransportErrorKind::Timeout, "Request timed out after 50ms"),
            0,
            4,
            &fixed(),
        ) {
            Some(RetryDecision::Fail(err)) => {
                assert!(err.is_timeout());
                assert_eq!(err.message(), "Request timed out after 50ms");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn retry_after_header_overrides_delay_for_429() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        let outcome = Outcome::HttpFailure {
            status: 429,
            body: Vec::new(),
            headers,
        };
        assert_eq!(
            decide(&outcome, 1, 1, &fixed()),
            Some(RetryDecision::Retry(Duration::from_secs(2)))
        );
    }

    #[test]
    fn retry_after_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("86400"));
        let outcome = Outcome::HttpFailure {
            status: 503,
            body: Vec::new(),
            headers,
        };
        assert_eq!(
            decide(&outcome, 1, 1, &fixed()),
            Some(RetryDecision::Retry(MAX_RETRY_AFTER))
        );
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            backoff: BackoffStrategy::Exponential {
                max: Duration::from_millis(1_000),
            },
        };
        let first = policy.delay_for(1);
        let third = policy.delay_for(3);
        let tenth = policy.delay_for(10);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(120));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(480));
        assert!(tenth >= Duration::from_millis(1_000) && tenth <= Duration::from_millis(1_200));
    }
}
