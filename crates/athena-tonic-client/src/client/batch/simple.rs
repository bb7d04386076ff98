use super::{Assembler, BatchConfig, Batcher, SourceExhausted};
use athena_tonic_core::{Batch, ClassificationItem, Result};
use futures::{Stream, StreamExt, stream::BoxStream};

/// Batches ready-made items from a single upstream stream.
///
/// Batches follow upstream order exactly.
pub struct SimpleBatcher {
    source: BoxStream<'static, ClassificationItem>,
    assembler: Assembler,
}

impl SimpleBatcher {
    /// # Errors
    ///
    /// Returns [`athena_tonic_core::Error::InvalidConfig`] if `config` is
    /// rejected by [`BatchConfig::validate`].
    pub fn new<S>(source: S, config: BatchConfig) -> Result<Self>
    where
        S: Stream<Item = ClassificationItem> + Send + 'static,
    {
        config.validate()?;
        Ok(Self {
            source: source.boxed(),
            assembler: Assembler::new(config),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        self.assembler.config()
    }
}

#[tonic::async_trait]
impl Batcher for SimpleBatcher {
    async fn next_batch(&mut self) -> Result<Batch> {
        let mut items = (&mut self.source).map(Ok);
        self.assembler.next_batch(&mut items).await
    }

    fn source_exhausted(&self) -> SourceExhausted {
        self.assembler.exhausted().clone()
    }

    async fn shutdown(&mut self) {
        // Nothing runs in the background; the source is dropped with `self`.
    }
}
