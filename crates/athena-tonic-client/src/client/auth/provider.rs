//! Per-call credential attachment.
//!
//! [`AuthLayer`] wraps the transport so every outgoing request asks a
//! [`TokenProvider`] for a token and sets `authorization: <scheme> <token>`.
//! The hook runs inside the transport's own task, so providers must be
//! `Send + Sync` and cheap to clone.
//!
//! A provider failure fails the call. The error is boxed into the transport
//! error and ends up as the source of the resulting `tonic::Status`, where
//! [`Error::oauth_from_status`] can recover it.

use super::{cache::TokenCache, snapshot::TokenSnapshot};
use athena_tonic_core::{BoxError, Error, Result};
use core::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use std::{sync::Arc, time::SystemTime};
use tonic::codegen::http::{HeaderValue, Request, header::AUTHORIZATION};
use tower::{Layer, Service};

/// Lifetime given to pre-issued tokens, which carry no expiry of their own.
const STATIC_TOKEN_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Source of credentials for outgoing calls.
#[tonic::async_trait]
pub trait TokenProvider: Clone + Send + Sync + 'static {
    async fn token(&self) -> Result<Arc<TokenSnapshot>>;
}

#[tonic::async_trait]
impl TokenProvider for TokenCache {
    async fn token(&self) -> Result<Arc<TokenSnapshot>> {
        self.get_token().await
    }
}

/// A pre-issued token that is sent as-is and never refreshed.
#[derive(Clone, Debug)]
pub struct StaticToken {
    snapshot: Arc<TokenSnapshot>,
}

impl StaticToken {
    /// Wraps a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the token is empty.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_scheme(token, "Bearer")
    }

    /// Wraps a token sent under a custom scheme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the token or scheme is empty.
    pub fn with_scheme(token: impl Into<String>, scheme: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let scheme = scheme.into();
        if token.trim().is_empty() {
            return Err(Error::Credential {
                reason: "token cannot be empty".to_string(),
            });
        }
        if scheme.trim().is_empty() {
            return Err(Error::Credential {
                reason: "token scheme cannot be empty".to_string(),
            });
        }
        Ok(Self {
            snapshot: Arc::new(TokenSnapshot::new(
                token,
                scheme.trim(),
                SystemTime::now(),
                STATIC_TOKEN_LIFETIME,
            )),
        })
    }
}

#[tonic::async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Arc<TokenSnapshot>> {
        Ok(Arc::clone(&self.snapshot))
    }
}

/// [`Layer`] producing [`AuthService`].
#[derive(Clone, Debug)]
pub struct AuthLayer<P> {
    provider: P,
}

impl<P> AuthLayer<P> {
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<S, P: Clone> Layer<S> for AuthLayer<P> {
    type Service = AuthService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            provider: self.provider.clone(),
        }
    }
}

/// Sets the `authorization` header on every request before forwarding it.
#[derive(Clone, Debug)]
pub struct AuthService<S, P> {
    inner: S,
    provider: P,
}

impl<S, P> AuthService<S, P> {
    pub const fn new(inner: S, provider: P) -> Self {
        Self { inner, provider }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }
}

impl<S, P, B> Service<Request<B>> for AuthService<S, P>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    P: TokenProvider,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn Future<Output = core::result::Result<Self::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<core::result::Result<(), BoxError>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // The ready service is the one that must handle this request; leave a
        // fresh clone behind for the next call.
        let clone = self.inner.clone();
        let mut inner = core::mem::replace(&mut self.inner, clone);
        let provider = self.provider.clone();

        Box::pin(async move {
            let token = provider.token().await?;
            let mut value = HeaderValue::try_from(token.authorization())?;
            value.set_sensitive(true);
            req.headers_mut().insert(AUTHORIZATION, value);
            inner.call(req).await.map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_tonic_core::OAuthError;
    use tower::{ServiceExt, service_fn};

    /// Echoes the authorization header back as the response.
    async fn echo(req: Request<()>) -> core::result::Result<String, BoxError> {
        Ok(req
            .headers()
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap_or_default().to_string())
            .unwrap_or_default())
    }

    #[derive(Clone)]
    struct Failing;

    #[tonic::async_trait]
    impl TokenProvider for Failing {
        async fn token(&self) -> Result<Arc<TokenSnapshot>> {
            Err(OAuthError::Network("connection refused".to_string()).into())
        }
    }

    #[tokio::test]
    async fn attaches_bearer_header() {
        let provider = StaticToken::new("abcd123").unwrap();
        let service = AuthLayer::new(provider).layer(service_fn(echo));

        let header = service.oneshot(Request::new(())).await.unwrap();
        assert_eq!(header, "Bearer abcd123");
    }

    #[tokio::test]
    async fn attaches_custom_scheme() {
        let provider = StaticToken::with_scheme("xyz789", "DPoP").unwrap();
        let service = AuthService::new(service_fn(echo), provider);

        let header = service.oneshot(Request::new(())).await.unwrap();
        assert_eq!(header, "DPoP xyz789");
    }

    #[tokio::test]
    async fn provider_failure_fails_the_call() {
        let service = AuthService::new(service_fn(echo), Failing);

        let err = service.oneshot(Request::new(())).await.unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert!(matches!(*err, Error::OAuth(OAuthError::Network(_))));
    }

    #[test]
    fn empty_static_token_is_rejected() {
        assert!(matches!(
            StaticToken::new(""),
            Err(Error::Credential { .. })
        ));
    }
}
