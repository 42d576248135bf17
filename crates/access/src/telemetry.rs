//! Retry telemetry counter.

use std::sync::atomic::{AtomicU32, Ordering};

/// Counts retries since the last successful response.
///
/// Shared by every client built from the same `Arc`. UI layers poll it to
/// show a degraded-connection indicator; nothing in the executor reads it.
#[derive(Debug, Default)]
pub struct RetryTelemetry {
    retries: AtomicU32,
}

impl RetryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::Acquire)
    }

    pub fn record_retry(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    pub fn reset(&self) {
        self.retries.store(0, Ordering::Release);
    }
}
