//! Client configuration.

use std::time::Duration;

use log::warn;

use crate::retry::RetryPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
/// Shortest per-attempt deadline; zero is raised to this.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Delay growth between successive attempts of one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Wait the base delay before every retry.
    #[default]
    Fixed,
    /// Double the base delay per attempt up to `max`, plus up to 20% jitter.
    Exponential { max: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined onto.
    pub base_url: String,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub backoff: BackoffStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            backoff: BackoffStrategy::Fixed,
        }
    }

    /// Read overrides from the environment.
    ///
    /// - `APPWIRE_API_URL`
    /// - `APPWIRE_TIMEOUT_MS`
    /// - `APPWIRE_RETRIES`
    /// - `APPWIRE_RETRY_DELAY_MS`
    /// - `APPWIRE_BACKOFF` (`fixed` or `exponential`)
    ///
    /// Unset, empty, or unparseable values keep the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::new(
            &env_var("APPWIRE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        );
        if let Some(ms) = env_number::<u64>("APPWIRE_TIMEOUT_MS").filter(|ms| *ms > 0) {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = env_number::<u32>("APPWIRE_RETRIES") {
            config.retries = retries;
        }
        if let Some(ms) = env_number::<u64>("APPWIRE_RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(backoff) = env_var("APPWIRE_BACKOFF") {
            config.backoff = match backoff.to_ascii_lowercase().as_str() {
                "exponential" => BackoffStrategy::Exponential {
                    max: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
                },
                "fixed" => BackoffStrategy::Fixed,
                other => {
                    warn!("[Config] Unknown APPWIRE_BACKOFF '{}', using fixed", other);
                    BackoffStrategy::Fixed
                }
            };
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: self.retry_delay,
            backoff: self.backoff,
        }
    }

    /// Absolute URLs pass through; relative paths join the base URL.
    pub fn resolve_url(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_var(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[Config] Ignoring non-numeric {}='{}'", name, raw);
            None
        }
    }
}
