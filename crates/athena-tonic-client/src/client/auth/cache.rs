//! OAuth client-credentials token cache.
//!
//! [`TokenCache`] keeps one [`TokenSnapshot`] and refreshes it against the
//! OAuth token endpoint. Reads never wait on a refresh while the current
//! snapshot is still valid:
//!
//! - **Fast path**: a valid snapshot is returned immediately. If it is also
//!   old (less than `refresh_threshold` of its lifetime left) a background
//!   refresh is started first.
//! - **Slow path**: with no valid snapshot the caller takes the refresh lock,
//!   re-checks, and refreshes inline. Failures propagate to the caller.
//! - **Background path**: started with `try_lock` only, skipped when another
//!   refresh holds the lock or is still running. Failures are logged and
//!   dropped; the existing snapshot stays in place.
//!
//! The cache is cheap to clone; clones share the same state.

use super::snapshot::{DEFAULT_EXPIRY_MARGIN, DEFAULT_REFRESH_THRESHOLD, TokenSnapshot};
use crate::client::telemetry::{increment_token_refresh_failures, increment_token_refreshes};
use athena_tonic_core::{Error, OAuthError, Result};
use core::time::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::SystemTime};
use tokio::{sync::Mutex, task::JoinHandle};

pub const DEFAULT_AUTH_URL: &str = "https://crispthinking.auth0.com/oauth/token";
pub const DEFAULT_AUDIENCE: &str = "crisp-athena-live";
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_EXPIRES_IN: u64 = 3600;
const DEFAULT_SCHEME: &str = "Bearer";

/// Endpoint and timing settings for a [`TokenCache`].
#[derive(Clone, Debug)]
pub struct TokenCacheOptions {
    pub auth_url: String,
    pub audience: String,
    /// Bound on one token request, connect included.
    pub request_timeout: Duration,
    /// Tokens closer than this to expiry are treated as expired.
    pub expiry_margin: Duration,
    /// Remaining-lifetime fraction that triggers a background refresh.
    pub refresh_threshold: f64,
}

impl Default for TokenCacheOptions {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            request_timeout: DEFAULT_AUTH_TIMEOUT,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }
}

/// Thread-safe OAuth token cache with non-blocking background refresh.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<Inner>,
}

struct Inner {
    client_id: String,
    client_secret: String,
    options: TokenCacheOptions,
    http: reqwest::Client,
    snapshot: RwLock<Option<Arc<TokenSnapshot>>>,
    refresh: Mutex<RefreshState>,
}

/// State serialized by the refresh lock.
#[derive(Default)]
struct RefreshState {
    in_flight: Option<JoinHandle<()>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenCache {
    /// Creates a cache for the default Athena audience and endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if either credential is empty.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        Self::with_options(client_id, client_secret, TokenCacheOptions::default())
    }

    /// Creates a cache with explicit endpoint and timing settings.
    ///
    /// # Errors
    ///
    /// - [`Error::Credential`] if either credential is empty.
    /// - [`Error::InvalidConfig`] if `refresh_threshold` is outside `(0, 1]`
    ///   or the HTTP client cannot be built.
    pub fn with_options(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        options: TokenCacheOptions,
    ) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if client_id.trim().is_empty() {
            return Err(Error::Credential {
                reason: "client_id cannot be empty".to_string(),
            });
        }
        if client_secret.trim().is_empty() {
            return Err(Error::Credential {
                reason: "client_secret cannot be empty".to_string(),
            });
        }
        if !(options.refresh_threshold > 0.0 && options.refresh_threshold <= 1.0) {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "refresh_threshold must be in (0, 1], got {}",
                    options.refresh_threshold
                ),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| Error::InvalidConfig {
                reason: format!("failed to build OAuth HTTP client: {e}"),
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                client_id,
                client_secret,
                options,
                http,
                snapshot: RwLock::new(None),
                refresh: Mutex::new(RefreshState::default()),
            }),
        })
    }

    pub fn options(&self) -> &TokenCacheOptions {
        &self.inner.options
    }

    /// The cached snapshot, if any, without validity checks.
    pub fn current(&self) -> Option<Arc<TokenSnapshot>> {
        self.inner.current()
    }

    /// Returns a valid token, refreshing inline only when none is cached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] when an inline refresh fails. Background
    /// refresh failures are never returned.
    pub async fn get_token(&self) -> Result<Arc<TokenSnapshot>> {
        let now = SystemTime::now();
        if let Some(current) = self.inner.current() {
            if self.inner.is_valid(&current, now) {
                if self.inner.is_old(&current, now) {
                    self.spawn_background_refresh();
                }
                return Ok(current);
            }
        }

        self.refresh_now().await
    }

    /// Drops the cached snapshot so the next call refreshes inline.
    pub fn invalidate(&self) {
        tracing::debug!("Invalidating cached OAuth token");
        *self.inner.snapshot.write() = None;
    }

    async fn refresh_now(&self) -> Result<Arc<TokenSnapshot>> {
        let _state = self.inner.refresh.lock().await;

        // Another caller may have refreshed while this one waited.
        if let Some(current) = self.inner.current() {
            if self.inner.is_valid(&current, SystemTime::now()) {
                return Ok(current);
            }
        }

        let snapshot = self.inner.fetch().await?;
        Ok(self.inner.store(snapshot))
    }

    fn spawn_background_refresh(&self) {
        let Ok(mut state) = self.inner.refresh.try_lock() else {
            tracing::trace!("Token refresh already holds the lock, skipping");
            return;
        };

        if state
            .in_flight
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return;
        }

        if !self.inner.needs_refresh(SystemTime::now()) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        state.in_flight = Some(tokio::spawn(async move {
            let _state = inner.refresh.lock().await;
            if !inner.needs_refresh(SystemTime::now()) {
                return;
            }
            match inner.fetch().await {
                Ok(snapshot) => {
                    inner.store(snapshot);
                }
                Err(e) => {
                    tracing::warn!("Background token refresh failed: {e}");
                }
            }
        }));
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, snapshot: TokenSnapshot) {
        self.inner.store(snapshot);
    }
}

impl Inner {
    fn current(&self) -> Option<Arc<TokenSnapshot>> {
        self.snapshot.read().clone()
    }

    fn store(&self, snapshot: TokenSnapshot) -> Arc<TokenSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write() = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn is_valid(&self, snapshot: &TokenSnapshot, now: SystemTime) -> bool {
        snapshot.is_valid_at(now, self.options.expiry_margin)
    }

    fn is_old(&self, snapshot: &TokenSnapshot, now: SystemTime) -> bool {
        snapshot.is_old_at(now, self.options.refresh_threshold)
    }

    fn needs_refresh(&self, now: SystemTime) -> bool {
        self.current()
            .is_none_or(|s| !self.is_valid(&s, now) || self.is_old(&s, now))
    }

    /// Performs one token request.
    async fn fetch(&self) -> core::result::Result<TokenSnapshot, OAuthError> {
        let result = self.request_token().await;
        match &result {
            Ok(snapshot) => {
                increment_token_refreshes();
                tracing::info!(
                    scheme = snapshot.scheme(),
                    "Refreshed OAuth token, valid for {}s",
                    snapshot
                        .expires_at()
                        .duration_since(snapshot.issued_at())
                        .unwrap_or_default()
                        .as_secs()
                );
            }
            Err(_) => increment_token_refresh_failures(),
        }
        result
    }

    async fn request_token(&self) -> core::result::Result<TokenSnapshot, OAuthError> {
        let body = TokenRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            audience: &self.options.audience,
            grant_type: "client_credentials",
        };

        let response = self
            .http
            .post(&self.options.auth_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        if !status.is_success() {
            let description = serde_json::from_slice::<ErrorResponse>(&bytes)
                .ok()
                .and_then(|body| body.error_description.or(body.error))
                .filter(|desc| !desc.is_empty());
            return Err(OAuthError::Status {
                status: status.as_u16(),
                description,
            });
        }

        let parsed: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| OAuthError::MalformedResponse(e.to_string()))?;

        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| OAuthError::MalformedResponse("missing access_token".to_string()))?;

        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        if expires_in == 0 {
            return Err(OAuthError::MalformedResponse(
                "expires_in must be positive".to_string(),
            ));
        }

        let scheme = parsed
            .token_type
            .as_deref()
            .map(str::trim)
            .filter(|scheme| !scheme.is_empty())
            .unwrap_or(DEFAULT_SCHEME);

        Ok(TokenSnapshot::new(
            access_token,
            scheme,
            SystemTime::now(),
            Duration::from_secs(expires_in),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn cache_for(server: &MockServer) -> TokenCache {
        TokenCache::with_options(
            "client-id",
            "client-secret",
            TokenCacheOptions {
                auth_url: server.url("/oauth/token"),
                request_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .unwrap()
    }

    /// A snapshot with 600 of 3600 seconds left: past the refresh threshold
    /// but outside the expiry margin.
    fn old_snapshot() -> TokenSnapshot {
        TokenSnapshot::new(
            "seeded",
            "Bearer",
            SystemTime::now() - Duration::from_secs(3000),
            Duration::from_secs(3600),
        )
    }

    async fn wait_for_token(cache: &TokenCache, expected: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if cache
                    .current()
                    .is_some_and(|s| s.access_token() == expected)
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert!(matches!(
            TokenCache::new("", "secret"),
            Err(Error::Credential { .. })
        ));
        assert!(matches!(
            TokenCache::new("id", "  "),
            Err(Error::Credential { .. })
        ));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let options = TokenCacheOptions {
            refresh_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            TokenCache::with_options("id", "secret", options),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn first_call_posts_client_credentials() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "client_id": "client-id",
                        "client_secret": "client-secret",
                        "audience": DEFAULT_AUDIENCE,
                        "grant_type": "client_credentials",
                    }));
                then.status(200).json_body(json!({
                    "access_token": "abcd123",
                    "expires_in": 3600,
                    "token_type": "Bearer",
                }));
            })
            .await;

        let cache = cache_for(&server);
        let token = cache.get_token().await.unwrap();
        assert_eq!(token.access_token(), "abcd123");
        assert_eq!(token.authorization(), "Bearer abcd123");

        // Served from the cache.
        let again = cache.get_token().await.unwrap();
        assert!(Arc::ptr_eq(&token, &again));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn scheme_is_trimmed_and_case_preserved() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(json!({
                    "access_token": "xyz789",
                    "token_type": "  DPoP ",
                }));
            })
            .await;

        let token = cache_for(&server).get_token().await.unwrap();
        assert_eq!(token.scheme(), "DPoP");
        assert_eq!(token.authorization(), "DPoP xyz789");

        // expires_in defaults to one hour.
        let lifetime = token
            .expires_at()
            .duration_since(token.issued_at())
            .unwrap();
        assert_eq!(lifetime, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn error_status_carries_description() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(401).json_body(json!({
                    "error": "access_denied",
                    "error_description": "Unauthorized",
                }));
            })
            .await;

        let err = cache_for(&server).get_token().await.unwrap_err();
        match err {
            Error::OAuth(OAuthError::Status {
                status,
                description,
            }) => {
                assert_eq!(status, 401);
                assert_eq!(description.as_deref(), Some("Unauthorized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_falls_back_to_error_field() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(403).json_body(json!({ "error": "forbidden" }));
            })
            .await;

        let err = cache_for(&server).get_token().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "OAuth request failed with status 403: forbidden"
        );
    }

    #[tokio::test]
    async fn missing_access_token_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(json!({ "expires_in": 3600 }));
            })
            .await;

        let err = cache_for(&server).get_token().await.unwrap_err();
        assert!(matches!(
            err,
            Error::OAuth(OAuthError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let cache = TokenCache::with_options(
            "client-id",
            "client-secret",
            TokenCacheOptions {
                auth_url: "http://127.0.0.1:9/oauth/token".to_string(),
                request_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        )
        .unwrap();

        let err = cache.get_token().await.unwrap_err();
        assert!(matches!(err, Error::OAuth(OAuthError::Network(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cold_callers_share_one_refresh() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200)
                    .delay(Duration::from_millis(100))
                    .json_body(json!({ "access_token": "fresh", "expires_in": 3600 }));
            })
            .await;

        let cache = cache_for(&server);
        let calls = (0..16).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_token().await })
        });

        for result in futures::future::join_all(calls).await {
            let token = result.unwrap().unwrap();
            assert_eq!(token.access_token(), "fresh");
            assert!(token.is_valid());
        }
        mock.assert_hits_async(1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn old_token_triggers_at_most_one_background_refresh() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200)
                    .delay(Duration::from_millis(100))
                    .json_body(json!({ "access_token": "fresh", "expires_in": 3600 }));
            })
            .await;

        let cache = cache_for(&server);
        cache.seed(old_snapshot());

        let calls = (0..16).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_token().await })
        });

        // Every caller gets the still-valid seeded token without waiting.
        for result in futures::future::join_all(calls).await {
            let token = result.unwrap().unwrap();
            assert_eq!(token.access_token(), "seeded");
        }

        wait_for_token(&cache, "fresh").await;
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn background_refresh_failure_keeps_current_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(500).body("internal error");
            })
            .await;

        let cache = cache_for(&server);
        cache.seed(old_snapshot());

        let token = cache.get_token().await.unwrap();
        assert_eq!(token.access_token(), "seeded");

        tokio::time::timeout(Duration::from_secs(5), async {
            while mock.hits_async().await == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let token = cache.get_token().await.unwrap();
        assert_eq!(token.access_token(), "seeded");
    }

    #[tokio::test]
    async fn invalidate_forces_inline_refresh() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200)
                    .json_body(json!({ "access_token": "fresh", "expires_in": 3600 }));
            })
            .await;

        let cache = cache_for(&server);
        cache.get_token().await.unwrap();
        cache.invalidate();
        assert!(cache.current().is_none());

        cache.get_token().await.unwrap();
        mock.assert_hits_async(2).await;
    }
}
