use crate::client::batch::ItemResult;
use athena_tonic_core::{BoxError, ClassificationItem, Error};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Intake receiver shared by every worker of one pool.
pub(crate) type SharedIntake<R> = Arc<Mutex<mpsc::Receiver<R>>>;

/// Reader task: the only consumer of the upstream stream.
///
/// Forwards raw items into the bounded intake queue until the source ends,
/// the intake closes, or the pool is cancelled. Returning drops the intake
/// sender, which lets the workers drain and stop.
pub(crate) async fn reader_loop<S, R>(
    mut source: S,
    intake: mpsc::Sender<R>,
    shutdown: CancellationToken,
) where
    S: Stream<Item = R> + Send + Unpin,
    R: Send,
{
    tracing::trace!("Reader started");
    let mut forwarded = 0_usize;

    loop {
        let item = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            item = source.next() => item,
        };

        let Some(item) = item else {
            tracing::debug!("Reader reached end of source after {forwarded} items");
            break;
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            sent = intake.send(item) => {
                if sent.is_err() {
                    tracing::debug!("Intake queue closed, reader stopping");
                    break;
                }
                forwarded += 1;
            }
        }
    }

    tracing::trace!("Reader stopped");
}

/// Worker task applying `transform` to raw items from the shared intake.
///
/// Results go out in completion order. A failed transform is forwarded and
/// stops this worker; the batcher cancels the rest of the pool when it sees
/// the error.
pub(crate) async fn worker_loop<R, F, Fut, E>(
    worker_id: usize,
    intake: SharedIntake<R>,
    transform: Arc<F>,
    results: mpsc::Sender<ItemResult>,
    shutdown: CancellationToken,
) where
    R: Send,
    F: Fn(R) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ClassificationItem, E>> + Send,
    E: Into<BoxError> + Send,
{
    tracing::trace!("Worker {worker_id} started");

    loop {
        let raw = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            raw = async { intake.lock().await.recv().await } => raw,
        };

        let Some(raw) = raw else {
            break;
        };

        let result = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            result = transform(raw) => result.map_err(Error::transform),
        };

        let failed = result.is_err();
        if failed {
            tracing::debug!("Worker {worker_id} transform failed");
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            sent = results.send(result) => {
                if sent.is_err() {
                    tracing::debug!("Worker {worker_id} results queue closed");
                    break;
                }
            }
        }

        if failed {
            break;
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}
