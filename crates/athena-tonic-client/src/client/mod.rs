//! Client runtime: credentials, batching, the persistent stream, and the
//! facade that wires them together.
//!
//! - [`auth`] - OAuth token cache and per-call credential layer.
//! - [`batch`] - simple and worker-pool batchers.
//! - [`streaming`] - the persistent `Classify` stream driver.
//! - [`image`] - image value object and correlation ids.
//! - [`output`] - per-item result helpers.
//! - [`channel`] - endpoint and authenticated channel construction.
//! - [`service`] - the [`AthenaClient`] facade.
//! - [`config`] - library options and the binary's CLI.
//! - [`telemetry`] - tracing subscriber and optional OpenTelemetry export.

pub mod auth;
pub mod batch;
pub mod channel;
pub mod config;
pub mod image;
pub mod output;
pub mod service;
pub mod streaming;
pub mod telemetry;

pub use auth::{StaticToken, TokenCache, TokenCacheOptions, TokenProvider};
pub use batch::{BatchConfig, Batcher, SimpleBatcher, SourceExhausted, WorkerPoolBatcher};
pub use channel::ChannelOptions;
pub use config::{ClientOptions, Compression, CorrelationStrategy};
pub use image::ImageData;
pub use service::{AthenaClient, AuthenticatedClient, ClassifyStream};
pub use streaming::{ClassifyTransport, StreamDriver};
