mod manager;
mod worker;

use super::{Assembler, BatchConfig, Batcher, ItemResult, SourceExhausted};
use athena_tonic_core::{Batch, BoxError, ClassificationItem, Error, Result};
use futures::Stream;
use manager::WorkerPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Batches items produced by a pool of concurrent transform workers.
///
/// Items in a batch follow transform completion order. With one worker this
/// is submission order; with more, only the multiset of items is preserved.
///
/// A transform failure is fatal: it is returned from the next
/// [`Batcher::next_batch`] call, the pool is cancelled, and every later call
/// returns [`Error::BatcherShutdown`].
///
/// Dropping the batcher cancels its tasks; [`Batcher::shutdown`] also waits
/// for them.
pub struct WorkerPoolBatcher {
    results: ReceiverStream<ItemResult>,
    assembler: Assembler,
    pool: WorkerPool,
    failed: bool,
}

impl WorkerPoolBatcher {
    /// Starts the reader and `num_workers` transform workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero workers or an invalid
    /// `config`.
    pub fn new<S, R, F, Fut, E>(
        source: S,
        transform: F,
        config: BatchConfig,
        num_workers: usize,
    ) -> Result<Self>
    where
        S: Stream<Item = R> + Send + 'static,
        R: Send + 'static,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = core::result::Result<ClassificationItem, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        config.validate()?;
        if num_workers == 0 {
            return Err(Error::InvalidConfig {
                reason: "num_workers must be greater than 0".to_string(),
            });
        }

        let capacity = config.max_batch_size.max(num_workers) * 2;
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let pool = WorkerPool::spawn(
            Box::pin(source),
            transform,
            num_workers,
            num_workers * 2,
            results_tx,
        );

        Ok(Self {
            results: ReceiverStream::new(results_rx),
            assembler: Assembler::new(config),
            pool,
            failed: false,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        self.assembler.config()
    }
}

#[tonic::async_trait]
impl Batcher for WorkerPoolBatcher {
    async fn next_batch(&mut self) -> Result<Batch> {
        if self.failed || self.pool.is_cancelled() {
            return Err(Error::BatcherShutdown);
        }

        match self.assembler.next_batch(&mut self.results).await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                tracing::warn!("Worker pool batcher failed: {e}");
                self.failed = true;
                self.pool.cancel();
                Err(e)
            }
        }
    }

    fn source_exhausted(&self) -> SourceExhausted {
        self.assembler.exhausted().clone()
    }

    async fn shutdown(&mut self) {
        // Closing first releases workers blocked on a full results queue.
        self.results.close();
        self.pool.shutdown().await;
    }
}
