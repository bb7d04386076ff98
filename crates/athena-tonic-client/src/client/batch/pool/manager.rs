//! Task pool behind [`super::WorkerPoolBatcher`].
//!
//! One reader task owns the upstream stream and feeds a bounded intake
//! queue. `num_workers` worker tasks share that queue's receiver, transform
//! each raw item, and push the result into the results queue the batcher
//! assembles from.
//!
//! All tasks watch one [`CancellationToken`]. Shutdown cancels it and then
//! waits a bounded time for each task to finish.

use super::worker::{SharedIntake, reader_loop, worker_loop};
use crate::client::batch::ItemResult;
use athena_tonic_core::{BoxError, ClassificationItem};
use core::time::Duration;
use futures::Stream;
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// How long `shutdown` waits for each task before aborting it.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) struct WorkerPool {
    handles: Vec<(String, JoinHandle<()>)>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Spawns the reader and `num_workers` workers on the current runtime.
    pub(crate) fn spawn<S, R, F, Fut, E>(
        source: S,
        transform: F,
        num_workers: usize,
        intake_capacity: usize,
        results: mpsc::Sender<ItemResult>,
    ) -> Self
    where
        S: Stream<Item = R> + Send + Unpin + 'static,
        R: Send + 'static,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ClassificationItem, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let shutdown_token = CancellationToken::new();
        let (intake_tx, intake_rx) = mpsc::channel(intake_capacity.max(1));
        let intake: SharedIntake<R> = Arc::new(Mutex::new(intake_rx));
        let transform = Arc::new(transform);

        let mut handles = Vec::with_capacity(num_workers + 1);
        handles.push((
            "reader".to_string(),
            tokio::spawn(reader_loop(source, intake_tx, shutdown_token.clone())),
        ));

        for worker_id in 0..num_workers {
            handles.push((
                format!("worker {worker_id}"),
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&intake),
                    Arc::clone(&transform),
                    results.clone(),
                    shutdown_token.clone(),
                )),
            ));
        }

        tracing::debug!("Spawned worker pool with {num_workers} workers");

        Self {
            handles,
            shutdown_token,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Signals every task to stop without waiting.
    pub(crate) fn cancel(&self) {
        self.shutdown_token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Cancels all tasks and waits for them to finish. Safe to call again;
    /// later calls find no handles left.
    pub(crate) async fn shutdown(&mut self) {
        self.shutdown_token.cancel();

        let handles = core::mem::take(&mut self.handles);
        if handles.is_empty() {
            return;
        }

        tracing::debug!(
            "Waiting up to {:?} per task for {} pool tasks to stop",
            self.shutdown_timeout,
            handles.len()
        );

        let shutdown_timeout = self.shutdown_timeout;
        let joins = handles.into_iter().map(|(name, handle)| async move {
            let abort = handle.abort_handle();
            match timeout(shutdown_timeout, handle).await {
                Ok(Ok(())) => {
                    tracing::trace!("{name} stopped");
                }
                Ok(Err(e)) => {
                    tracing::error!("{name} ended abnormally: {e}");
                }
                Err(_) => {
                    tracing::warn!("{name} shutdown timed out, aborting");
                    abort.abort();
                }
            }
        });

        futures::future::join_all(joins).await;

        tracing::debug!("Worker pool shutdown complete");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
