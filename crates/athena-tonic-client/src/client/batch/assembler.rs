use super::{BatchConfig, ItemResult, SourceExhausted};
use athena_tonic_core::{Batch, Result};
use futures::{Stream, StreamExt};
use tokio::time::{sleep, timeout};

/// Batch assembly state machine shared by every [`super::Batcher`].
///
/// The buffer lives only for the duration of one `next_batch` call, so a
/// batch is never observable while partially filled.
pub(crate) struct Assembler {
    config: BatchConfig,
    exhausted: SourceExhausted,
}

impl Assembler {
    pub(crate) fn new(config: BatchConfig) -> Self {
        Self {
            config,
            exhausted: SourceExhausted::new(),
        }
    }

    pub(crate) fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub(crate) fn exhausted(&self) -> &SourceExhausted {
        &self.exhausted
    }

    fn keepalive(&self) -> Batch {
        Batch::keepalive(self.config.deployment_id.clone())
    }

    fn mark_exhausted(&self) {
        if self.exhausted.set() {
            tracing::debug!("Batch source exhausted");
        }
    }

    /// Pulls items from `source` until one batch is ready.
    ///
    /// An `Err` item is returned as-is and ends the call; items already
    /// buffered are dropped with it.
    pub(crate) async fn next_batch<S>(&self, source: &mut S) -> Result<Batch>
    where
        S: Stream<Item = ItemResult> + Unpin + Send,
    {
        let keepalive_interval = self.config.keepalive_interval;

        if self.exhausted.get() {
            sleep(keepalive_interval).await;
            return Ok(self.keepalive());
        }

        let first = match timeout(keepalive_interval, source.next()).await {
            Err(_elapsed) => return Ok(self.keepalive()),
            Ok(None) => {
                self.mark_exhausted();
                sleep(keepalive_interval).await;
                return Ok(self.keepalive());
            }
            Ok(Some(item)) => item?,
        };

        let mut items = Vec::with_capacity(self.config.max_batch_size);
        items.push(first);

        while items.len() < self.config.max_batch_size {
            match timeout(self.config.batch_timeout, source.next()).await {
                Err(_elapsed) => break,
                Ok(None) => {
                    self.mark_exhausted();
                    break;
                }
                Ok(Some(item)) => items.push(item?),
            }
        }

        Ok(Batch::new(self.config.deployment_id.clone(), items))
    }
}
