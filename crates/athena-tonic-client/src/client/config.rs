use crate::client::{
    auth::{
        TokenCacheOptions,
        cache::{DEFAULT_AUDIENCE, DEFAULT_AUTH_TIMEOUT, DEFAULT_AUTH_URL},
    },
    batch::BatchConfig,
    channel::ChannelOptions,
    image::{CorrelationProvider, HashCorrelationProvider, UuidCorrelationProvider},
};
use anyhow::bail;
use athena_tonic_core::{
    Error, Result,
    proto::RequestEncoding,
    types::{
        DEFAULT_BATCH_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL,
        DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_MESSAGE_SIZE,
    },
};
use clap::{Parser, ValueEnum};
use core::{fmt, time::Duration};
use std::{path::PathBuf, sync::Arc};
use tonic::codec::CompressionEncoding;

/// gRPC message compression for the classification stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

/// How correlation ids are assigned to outgoing items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CorrelationStrategy {
    /// SHA-256 of the image bytes.
    #[default]
    Hash,
    /// A random v4 UUID.
    Uuid,
}

impl CorrelationStrategy {
    pub fn provider(self) -> Arc<dyn CorrelationProvider> {
        match self {
            Self::Hash => Arc::new(HashCorrelationProvider),
            Self::Uuid => Arc::new(UuidCorrelationProvider),
        }
    }
}

/// Library-level settings for [`AthenaClient`](crate::AthenaClient).
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub host: String,
    pub tls: bool,
    pub deployment_id: String,
    pub affiliate: String,
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
    pub keepalive_interval: Duration,
    /// Ends a stream after this long without a response while input is
    /// still active. Also the deadline for unary calls. `None` disables it.
    pub idle_timeout: Option<Duration>,
    /// Transform workers used by the worker-pool pipeline.
    pub num_workers: usize,
    pub request_encoding: RequestEncoding,
    pub compression: Compression,
    pub correlation: CorrelationStrategy,
    pub max_decoding_message_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            tls: true,
            deployment_id: "default".to_string(),
            affiliate: "default".to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            num_workers: 1,
            request_encoding: RequestEncoding::Uncompressed,
            compression: Compression::None,
            correlation: CorrelationStrategy::Hash,
            max_decoding_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientOptions {
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::new(self.deployment_id.clone())
            .with_max_batch_size(self.max_batch_size)
            .with_batch_timeout(self.batch_timeout)
            .with_keepalive_interval(self.keepalive_interval)
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            max_decoding_message_size: self.max_decoding_message_size,
            ..ChannelOptions::new(self.host.clone()).with_tls(self.tls)
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for batch limits the batchers reject
    /// or a zero worker count.
    pub fn validate(&self) -> Result<()> {
        self.batch_config().validate()?;
        if self.num_workers == 0 {
            return Err(Error::InvalidConfig {
                reason: "num_workers must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Command-line configuration for the `athena-classify` binary.
///
/// Every flag can also be set through the environment variable named in its
/// help text.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "athena-classify",
    version,
    about = "Stream images to the Athena classification service"
)]
pub struct CliArgs {
    /// Classification service address (`host:port`).
    ///
    /// Environment variable: `ATHENA_HOST`
    #[arg(long, env = "ATHENA_HOST", default_value_t = String::from("localhost"))]
    pub host: String,

    /// Connect without TLS.
    #[arg(long, env = "ATHENA_PLAINTEXT", default_value_t = false)]
    pub plaintext: bool,

    /// Environment variable: `ATHENA_DEPLOYMENT_ID`
    #[arg(long, env = "ATHENA_DEPLOYMENT_ID", default_value_t = String::from("default"))]
    pub deployment_id: String,

    /// Environment variable: `ATHENA_AFFILIATE`
    #[arg(long, env = "ATHENA_AFFILIATE", default_value_t = String::from("default"))]
    pub affiliate: String,

    /// OAuth client id.
    ///
    /// Environment variable: `OAUTH_CLIENT_ID`
    #[arg(long, env = "OAUTH_CLIENT_ID", default_value_t = String::new(), hide_default_value = true)]
    pub client_id: String,

    /// OAuth client secret.
    ///
    /// Environment variable: `OAUTH_CLIENT_SECRET`
    #[arg(long, env = "OAUTH_CLIENT_SECRET", default_value_t = String::new(), hide_env_values = true, hide_default_value = true)]
    pub client_secret: String,

    /// Environment variable: `OAUTH_AUTH_URL`
    #[arg(long, env = "OAUTH_AUTH_URL", default_value_t = String::from(DEFAULT_AUTH_URL))]
    pub auth_url: String,

    /// Environment variable: `OAUTH_AUDIENCE`
    #[arg(long, env = "OAUTH_AUDIENCE", default_value_t = String::from(DEFAULT_AUDIENCE))]
    pub audience: String,

    /// Maximum number of images per request batch.
    ///
    /// Environment variable: `MAX_BATCH_SIZE`
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    /// Milliseconds to wait for one more image once a batch is non-empty.
    ///
    /// Environment variable: `BATCH_TIMEOUT_MS`
    #[arg(long, env = "BATCH_TIMEOUT_MS", default_value_t = 100)]
    pub batch_timeout_ms: u64,

    /// Milliseconds between keepalives on an idle stream.
    ///
    /// Environment variable: `KEEPALIVE_INTERVAL_MS`
    #[arg(long, env = "KEEPALIVE_INTERVAL_MS", default_value_t = 1_000)]
    pub keepalive_interval_ms: u64,

    /// Seconds without a response before an active stream is ended. `0`
    /// disables the cutoff.
    ///
    /// Environment variable: `IDLE_TIMEOUT_SECS`
    #[arg(long, env = "IDLE_TIMEOUT_SECS", default_value_t = 120)]
    pub idle_timeout_secs: u64,

    /// Environment variable: `COMPRESSION`
    #[arg(long, env = "COMPRESSION", value_enum, default_value_t = Compression::None)]
    pub compression: Compression,

    /// Environment variable: `CORRELATION`
    #[arg(long, env = "CORRELATION", value_enum, default_value_t = CorrelationStrategy::Hash)]
    pub correlation: CorrelationStrategy,

    /// Print the deployments the service offers and exit.
    #[arg(long, default_value_t = false)]
    pub list_deployments: bool,

    /// Image files to classify.
    pub images: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client: ClientOptions,
    pub client_id: String,
    pub client_secret: String,
    pub auth: TokenCacheOptions,
    pub list_deployments: bool,
    pub images: Vec<PathBuf>,
}

impl TryFrom<CliArgs> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> core::result::Result<Self, Self::Error> {
        if args.max_batch_size == 0 {
            bail!("MAX_BATCH_SIZE must be greater than 0");
        }
        if args.keepalive_interval_ms == 0 {
            bail!("KEEPALIVE_INTERVAL_MS must be greater than 0");
        }
        if args.client_id.trim().is_empty() || args.client_secret.trim().is_empty() {
            bail!("OAUTH_CLIENT_ID and OAUTH_CLIENT_SECRET must be set");
        }
        if !args.list_deployments && args.images.is_empty() {
            bail!("No images given; pass image paths or --list-deployments");
        }

        let idle_timeout =
            (args.idle_timeout_secs > 0).then(|| Duration::from_secs(args.idle_timeout_secs));

        let client = ClientOptions {
            host: args.host,
            tls: !args.plaintext,
            deployment_id: args.deployment_id,
            affiliate: args.affiliate,
            max_batch_size: args.max_batch_size,
            batch_timeout: Duration::from_millis(args.batch_timeout_ms),
            keepalive_interval: Duration::from_millis(args.keepalive_interval_ms),
            idle_timeout,
            compression: args.compression,
            correlation: args.correlation,
            ..ClientOptions::default()
        };

        let auth = TokenCacheOptions {
            auth_url: args.auth_url,
            audience: args.audience,
            request_timeout: DEFAULT_AUTH_TIMEOUT,
            ..TokenCacheOptions::default()
        };

        Ok(Self {
            client,
            client_id: args.client_id,
            client_secret: args.client_secret,
            auth,
            list_deployments: args.list_deployments,
            images: args.images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "athena-classify",
            "--client-id",
            "id",
            "--client-secret",
            "secret",
        ];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_library_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.max_batch_size, 10);
        assert_eq!(options.batch_timeout, Duration::from_millis(100));
        assert_eq!(options.keepalive_interval, Duration::from_secs(1));
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(options.num_workers, 1);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let options = ClientOptions {
            num_workers: 0,
            ..ClientOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn cli_converts_into_config() {
        let args = parse(&[
            "--plaintext",
            "--idle-timeout-secs",
            "0",
            "--compression",
            "zstd",
            "a.png",
        ]);
        let config = ClientConfig::try_from(args).unwrap();
        assert!(!config.client.tls);
        assert_eq!(config.client.idle_timeout, None);
        assert_eq!(config.client.compression, Compression::Zstd);
        assert_eq!(config.images, [PathBuf::from("a.png")]);
        assert_eq!(config.auth.audience, DEFAULT_AUDIENCE);
    }

    #[test]
    fn cli_rejects_zero_batch_size() {
        let args = parse(&["--max-batch-size", "0", "a.png"]);
        assert!(ClientConfig::try_from(args).is_err());
    }

    #[test]
    fn cli_requires_work() {
        assert!(ClientConfig::try_from(parse(&[])).is_err());
        assert!(ClientConfig::try_from(parse(&["--list-deployments"])).is_ok());
    }
}
