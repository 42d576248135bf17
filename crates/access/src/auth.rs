//! Access token lifecycle.
//!
//! [`TokenManager`] keeps the current access token in memory with its expiry,
//! persists both tokens through a [`SecretStore`], and renews them through a
//! [`TokenRefresher`]. Refreshes are single-flight: while one is running,
//! every other caller awaits the same shared future instead of starting its
//! own exchange. Refresh tokens are rotated on use, so a second parallel
//! exchange would invalidate the first.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use appwire_core::SecretStore;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, info};
use serde::Deserialize;
use thiserror::Error;

// Storage keys for the session tokens.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Seconds before actual expiry to treat a cached token as expired (clock skew / latency).
const TOKEN_EXPIRY_BUFFER_SECS: u64 = 60;
/// TTL assumed when the server does not send `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
/// Upper bound on how long a cached token is trusted, whatever `expires_in` says.
const MAX_TOKEN_TTL_SECS: u64 = 30 * 24 * 3600;
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No refresh token configured. Please sign in first.")]
    MissingRefreshToken,

    #[error("Token refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Token refresh failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse token response: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] appwire_core::Error),
}

/// Tokens returned by a refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the server rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchanges a refresh token for new credentials.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenError>;
}

/// The executor's view of credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid access token, if a session exists.
    async fn valid_token(&self) -> Option<String>;

    /// Renew credentials. `true` means a new token is installed.
    async fn refresh_token(&self) -> bool;
}

#[derive(Debug, Clone)]
struct CachedAccessToken {
    token: String,
    expires_at: Instant,
}

type InFlightRefresh = Shared<BoxFuture<'static, bool>>;

struct TokenManagerInner {
    store: Arc<dyn SecretStore>,
    refresher: Arc<dyn TokenRefresher>,
    cache: RwLock<Option<CachedAccessToken>>,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

/// Owns the session tokens and serializes their renewal.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<TokenManagerInner>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn SecretStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(TokenManagerInner {
                store,
                refresher,
                cache: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Install tokens obtained from sign-in.
    pub fn store_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: Option<u64>,
    ) -> Result<(), TokenError> {
        info!("[Auth] Storing session");
        self.inner
            .store
            .set_secret(REFRESH_TOKEN_KEY, refresh_token)?;
        self.inner.store.set_secret(ACCESS_TOKEN_KEY, access_token)?;
        self.inner.cache_token(access_token, expires_in);
        Ok(())
    }

    /// Forget all credentials. Store failures are logged, not returned.
    pub fn clear_session(&self) {
        info!("[Auth] Clearing session");
        if let Err(e) = self.inner.store.delete_secret(REFRESH_TOKEN_KEY) {
            error!("[Auth] Failed to delete refresh token: {}", e);
        }
        if let Err(e) = self.inner.store.delete_secret(ACCESS_TOKEN_KEY) {
            error!("[Auth] Failed to delete access token: {}", e);
        }
        *self
            .inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_session(&self) -> bool {
        self.inner
            .store
            .get_secret(REFRESH_TOKEN_KEY)
            .map(|t| t.is_some())
            .unwrap_or(false)
    }

    /// Return a valid access token, refreshing first when the cached one expired.
    ///
    /// - Cache hit: returns immediately.
    /// - Cache miss or expired with a stored refresh token: single-flight refresh.
    /// - No refresh token: falls back to a stored access token, if any.
    pub async fn valid_token(&self) -> Option<String> {
        if let Some(token) = self.inner.cached_token() {
            return Some(token);
        }

        if self.has_session() {
            if self.refresh().await {
                return self.inner.cached_token();
            }
            return None;
        }

        self.inner.store.get_secret(ACCESS_TOKEN_KEY).ok().flatten()
    }

    /// Refresh credentials, joining an in-flight refresh when there is one.
    pub async fn refresh(&self) -> bool {
        let refresh = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("[Auth] Joining in-flight token refresh");
                    in_flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let refresh = async move {
                        let refreshed = inner.perform_refresh().await;
                        inner
                            .in_flight
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .take();
                        refreshed
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }
}

impl TokenManagerInner {
    fn cached_token(&self) -> Option<String> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.token.clone())
    }

    fn cache_token(&self, token: &str, expires_in: Option<u64>) {
        let ttl = expires_in
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
            .saturating_sub(TOKEN_EXPIRY_BUFFER_SECS);
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(ttl.min(MAX_TOKEN_TTL_SECS)))
            .unwrap_or(now);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(CachedAccessToken {
            token: token.to_string(),
            expires_at,
        });
    }

    async fn perform_refresh(&self) -> bool {
        match self.exchange().await {
            Ok(()) => true,
            Err(e) => {
                error!("[Auth] Token refresh failed: {}", e);
                false
            }
        }
    }

    async fn exchange(&self) -> Result<(), TokenError> {
        let refresh_token = self
            .store
            .get_secret(REFRESH_TOKEN_KEY)?
            .ok_or(TokenError::MissingRefreshToken)?;

        debug!("[Auth] Refreshing access token");
        let grant = self.refresher.refresh(&refresh_token).await?;

        // Persist the rotated refresh token; the old one is invalid after use.
        if let Some(rotated) = grant.refresh_token.as_deref() {
            self.store.set_secret(REFRESH_TOKEN_KEY, rotated)?;
        }
        self.store.set_secret(ACCESS_TOKEN_KEY, &grant.access_token)?;
        self.cache_token(&grant.access_token, grant.expires_in);

        debug!(
            "[Auth] Access token refreshed (expires_in={:?})",
            grant.expires_in
        );
        Ok(())
    }
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn valid_token(&self) -> Option<String> {
        TokenManager::valid_token(self).await
    }

    async fn refresh_token(&self) -> bool {
        self.refresh().await
    }
}

#[derive(Debug, Deserialize)]
struct RefreshErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

/// Refresh exchange over HTTP.
///
/// POSTs `{"refresh_token": "..."}` to the configured URL and expects
/// `{"access_token", "refresh_token"?, "expires_in"?}` back.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTokenRefresher {
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.trim().to_string(),
            api_key: None,
        }
    }

    /// Send an `apikey` header with every exchange.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<RefreshErrorResponse>(&body)
                .ok()
                .and_then(|err| err.error_description.or(err.message).or(err.error))
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
