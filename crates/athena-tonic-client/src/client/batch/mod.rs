//! # Adaptive Request Batching
//!
//! A [`Batcher`] turns an unbounded sequence of [`ClassificationItem`]s into
//! wire-sized [`Batch`]es for the persistent classification stream.
//!
//! ## Variants
//!
//! - [`SimpleBatcher`] pulls ready-made items from one upstream stream.
//! - [`WorkerPoolBatcher`] reads raw items on a dedicated task and fans them
//!   out to `num_workers` transform workers before assembly.
//!
//! Both share the same assembly rules:
//!
//! 1. With nothing buffered, wait up to `keepalive_interval` for an item. On
//!    expiry emit an empty batch (a keepalive).
//! 2. With at least one item buffered, wait up to `batch_timeout` for each
//!    further item. Emit as soon as the batch is full, the wait expires, or
//!    the source ends.
//! 3. Once the source has ended, emit a keepalive every `keepalive_interval`
//!    until the caller stops pulling.
//!
//! ## Exhaustion
//!
//! [`SourceExhausted`] is a shared, monotonic flag. It flips once when the
//! upstream ends and never resets, which lets the stream driver disarm its
//! idle timeout for the tail of pending responses.

mod assembler;
pub mod pool;
pub mod simple;


pub use pool::WorkerPoolBatcher;
pub use simple::SimpleBatcher;

use athena_tonic_core::{
    Batch, ClassificationItem, Error, Result,
    types::{DEFAULT_BATCH_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_MAX_BATCH_SIZE},
};
use core::time::Duration;
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) use assembler::Assembler;

/// Produces batches for the classification stream.
#[tonic::async_trait]
pub trait Batcher: Send + 'static {
    /// Waits for and returns the next batch. An empty batch is a keepalive.
    ///
    /// # Errors
    ///
    /// A failing batcher returns the error once and
    /// [`Error::BatcherShutdown`] on every later call.
    async fn next_batch(&mut self) -> Result<Batch>;

    /// Shared handle to the exhaustion flag.
    fn source_exhausted(&self) -> SourceExhausted;

    fn is_source_exhausted(&self) -> bool {
        self.source_exhausted().get()
    }

    /// Stops background work and releases queues. Idempotent.
    async fn shutdown(&mut self);
}

/// Monotonic "upstream has ended" flag shared between a batcher and its
/// observers.
#[derive(Clone, Debug, Default)]
pub struct SourceExhausted(Arc<AtomicBool>);

impl SourceExhausted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Marks the source as ended. Returns `true` only for the first call.
    pub(crate) fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Limits applied while assembling batches.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub deployment_id: String,
    pub max_batch_size: usize,
    /// Wait for one more item once the batch is non-empty.
    pub batch_timeout: Duration,
    /// Wait with an empty batch before emitting a keepalive.
    pub keepalive_interval: Duration,
}

impl BatchConfig {
    pub fn new(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    #[must_use]
    pub const fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    #[must_use]
    pub const fn with_keepalive_interval(mut self, keepalive_interval: Duration) -> Self {
        self.keepalive_interval = keepalive_interval;
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero batch size or a zero
    /// keepalive interval.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::InvalidConfig {
                reason: "max_batch_size must be greater than 0".to_string(),
            });
        }
        if self.keepalive_interval.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "keepalive_interval must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Items already shaped for the wire, as consumed by [`Assembler`].
pub(crate) type ItemResult = Result<ClassificationItem>;
