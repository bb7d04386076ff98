//! Channel construction for the classification service.
//!
//! [`connect_lazy`] returns a channel that dials on first use and attaches a
//! fresh credential to every call, so token failures show up on the call
//! that needed the token rather than at construction.

use crate::client::auth::{AuthService, TokenProvider};
use athena_tonic_core::{Error, Result, types::DEFAULT_MAX_MESSAGE_SIZE};
use core::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

pub const DEFAULT_HTTP2_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Transport settings for the classification channel.
#[derive(Clone, Debug)]
pub struct ChannelOptions {
    /// `host:port`, optionally with an `http://` or `https://` scheme.
    pub host: String,
    /// Use TLS with the platform's native roots. Ignored for `http://` hosts.
    pub tls: bool,
    pub http2_keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    /// Send HTTP/2 pings even with no call in flight.
    pub keepalive_while_idle: bool,
    pub tcp_keepalive: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// Largest response message the client will decode.
    pub max_decoding_message_size: usize,
}

impl ChannelOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            tls: true,
            http2_keepalive_interval: DEFAULT_HTTP2_KEEPALIVE_INTERVAL,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            keepalive_while_idle: true,
            tcp_keepalive: Some(DEFAULT_TCP_KEEPALIVE),
            connect_timeout: None,
            max_decoding_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Normalises `host` into a URI, adding a scheme when none is given.
fn resolve_uri(host: &str, tls: bool) -> Result<String> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::InvalidHost {
            reason: "host cannot be empty".to_string(),
        });
    }
    if host.contains("://") {
        return Ok(host.to_string());
    }
    let scheme = if tls { "https" } else { "http" };
    Ok(format!("{scheme}://{host}"))
}

/// Builds the endpoint described by `options`.
///
/// # Errors
///
/// Returns [`Error::InvalidHost`] for an empty or unparsable host and
/// [`Error::Transport`] if TLS cannot be configured.
pub fn endpoint(options: &ChannelOptions) -> Result<Endpoint> {
    let uri = resolve_uri(&options.host, options.tls)?;
    let mut endpoint = Endpoint::from_shared(uri.clone()).map_err(|e| Error::InvalidHost {
        reason: format!("{uri}: {e}"),
    })?;

    endpoint = endpoint
        .http2_keep_alive_interval(options.http2_keepalive_interval)
        .keep_alive_timeout(options.keepalive_timeout)
        .keep_alive_while_idle(options.keepalive_while_idle)
        .tcp_keepalive(options.tcp_keepalive)
        .tcp_nodelay(true);

    if let Some(timeout) = options.connect_timeout {
        endpoint = endpoint.connect_timeout(timeout);
    }

    if options.tls && uri.starts_with("https://") {
        endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
    }

    Ok(endpoint)
}

/// Creates a lazily connected channel that authenticates every call with
/// `provider`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// See [`endpoint`].
pub fn connect_lazy<P: TokenProvider>(
    options: &ChannelOptions,
    provider: P,
) -> Result<AuthService<Channel, P>> {
    let channel = endpoint(options)?.connect_lazy();
    tracing::debug!("Created lazy channel to {}", options.host);
    Ok(AuthService::new(channel, provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_host_is_rejected() {
        let err = endpoint(&ChannelOptions::new("  ")).unwrap_err();
        assert!(matches!(err, Error::InvalidHost { .. }));
    }

    #[test]
    fn scheme_follows_tls_setting() {
        assert_eq!(
            resolve_uri("athena.example.com:443", true).unwrap(),
            "https://athena.example.com:443"
        );
        assert_eq!(
            resolve_uri("localhost:50051", false).unwrap(),
            "http://localhost:50051"
        );
        assert_eq!(
            resolve_uri("http://localhost:50051", true).unwrap(),
            "http://localhost:50051"
        );
    }

    #[test]
    fn plaintext_endpoint_keeps_uri() {
        let endpoint = endpoint(&ChannelOptions::new("localhost:50051").with_tls(false)).unwrap();
        let uri = endpoint.uri();
        assert_eq!(uri.scheme_str(), Some("http"));
        assert_eq!(uri.host(), Some("localhost"));
        assert_eq!(uri.port_u16(), Some(50051));
    }

    #[test]
    fn unparsable_host_is_rejected() {
        let options = ChannelOptions::new("exa mple:50051").with_tls(false);
        assert!(matches!(endpoint(&options), Err(Error::InvalidHost { .. })));
    }

    #[test]
    fn defaults_enable_tls_and_keepalive() {
        let options = ChannelOptions::default();
        assert!(options.tls);
        assert!(options.keepalive_while_idle);
        assert_eq!(options.http2_keepalive_interval, Duration::from_secs(60));
        assert_eq!(options.keepalive_timeout, Duration::from_secs(30));
        assert_eq!(options.max_decoding_message_size, 64 * 1024 * 1024);
    }
}
