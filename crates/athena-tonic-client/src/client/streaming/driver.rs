//! Persistent classification stream driver.
//!
//! [`StreamDriver::classify`] owns one long-lived `Classify` call. A pump task
//! pulls batches from a [`Batcher`] and writes them to the request stream
//! while the driver task reads responses and forwards them to the caller.
//!
//! ## Outcomes
//!
//! - **Clean end**: the idle cutoff passed while input was still active, the
//!   server closed the stream, the call failed with a plain gRPC status, or
//!   the caller dropped the response stream.
//! - **Error**: a response carried a global error
//!   ([`Error::Classification`]), the batcher failed ([`Error::Transform`]),
//!   or a token could not be obtained ([`Error::OAuth`]). The error is the
//!   last item the caller receives.
//!
//! On every outcome the pump is cancelled and awaited, which runs
//! [`Batcher::shutdown`] exactly once, and the transport stream is dropped
//! before the caller sees the end of the response stream. No reconnection is
//! attempted.

use super::{
    session::StreamSession,
    transport::{ClassifyTransport, ResponseStream},
};
use crate::client::{
    auth::TokenCache,
    batch::Batcher,
    telemetry::{
        increment_batches_sent, increment_keepalives_sent, increment_responses,
        increment_stream_errors, increment_streams_started, record_stream_duration,
    },
};
use athena_tonic_core::{
    Error, Result,
    proto::{ClassifyRequest, ClassifyResponse},
};
use core::time::Duration;
use futures::{FutureExt, StreamExt, future::Fuse};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tracing::Instrument;

/// Batches buffered between the pump and the transport.
const REQUEST_BUFFER: usize = 4;

/// Responses buffered between the driver and the caller.
const DEFAULT_RESPONSE_BUFFER: usize = 32;

/// Drives persistent `Classify` streams over a [`ClassifyTransport`].
#[derive(Clone)]
pub struct StreamDriver<T> {
    transport: T,
    token_cache: Option<TokenCache>,
    response_buffer: usize,
}

impl<T: ClassifyTransport> StreamDriver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            token_cache: None,
            response_buffer: DEFAULT_RESPONSE_BUFFER,
        }
    }

    /// Invalidates `cache` when the server rejects the credential.
    #[must_use]
    pub fn with_token_cache(mut self, cache: TokenCache) -> Self {
        self.token_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_response_buffer(mut self, response_buffer: usize) -> Self {
        self.response_buffer = response_buffer.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Starts a persistent stream fed by `batcher`.
    ///
    /// `idle_timeout` ends the stream cleanly when no response has arrived
    /// for that long while the batch source is still active. `None` waits
    /// forever.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn classify<B: Batcher>(
        &self,
        batcher: B,
        idle_timeout: Option<Duration>,
    ) -> ReceiverStream<Result<ClassifyResponse>> {
        let (tx, rx) = mpsc::channel(self.response_buffer);

        tracing::info!(
            "Starting persistent classification with idle timeout: {:?}",
            idle_timeout
        );

        let fut = drive(
            self.transport.clone(),
            self.token_cache.clone(),
            batcher,
            idle_timeout,
            tx,
        );
        tokio::spawn(fut.instrument(tracing::info_span!("classify_stream")));

        ReceiverStream::new(rx)
    }
}

async fn drive<T, B>(
    mut transport: T,
    token_cache: Option<TokenCache>,
    batcher: B,
    idle_timeout: Option<Duration>,
    tx: mpsc::Sender<Result<ClassifyResponse>>,
) where
    T: ClassifyTransport,
    B: Batcher,
{
    increment_streams_started();

    let mut session = StreamSession::new(batcher.source_exhausted(), idle_timeout);
    let shutdown = CancellationToken::new();
    let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER);
    let (failure_tx, failure_rx) = oneshot::channel();

    let pump = tokio::spawn(
        pump_batches(batcher, request_tx, failure_tx, shutdown.clone()).in_current_span(),
    );

    let mut failure = failure_rx.fuse();

    // The server may hold the headers back until its first response, so the
    // caller and the pump can both end the stream before it opens.
    let opened = tokio::select! {
        biased;

        () = tx.closed() => {
            tracing::debug!("Response consumer dropped before the stream opened");
            Err(Ok(()))
        }

        Ok(err) = &mut failure => Err(Err(err)),

        opened = transport.open(ReceiverStream::new(request_rx)) => Ok(opened),
    };

    let outcome = match opened {
        Ok(Ok(responses)) => {
            forward_responses(responses, &mut failure, &mut session, token_cache.as_ref(), &tx)
                .await
        }
        Ok(Err(status)) => status_outcome(status, token_cache.as_ref(), &session),
        Err(outcome) => outcome,
    };

    shutdown.cancel();
    if let Err(e) = pump.await {
        tracing::error!("Batch pump ended abnormally: {e}");
    }

    let elapsed = session.elapsed();
    record_stream_duration(elapsed.as_secs_f64() * 1000.0);

    match outcome {
        Ok(()) => {
            tracing::info!(
                "Classification completed after {:.1}s",
                elapsed.as_secs_f64()
            );
        }
        Err(e) => {
            increment_stream_errors();
            tracing::warn!(
                "Classification failed after {:.1}s: {e}",
                elapsed.as_secs_f64()
            );
            // The caller may already be gone.
            let _ = tx.send(Err(e)).await;
        }
    }
}

/// Reads responses until one of the terminal conditions is reached.
///
/// The transport stream is dropped on return.
async fn forward_responses(
    mut responses: ResponseStream,
    failure: &mut Fuse<oneshot::Receiver<Error>>,
    session: &mut StreamSession,
    token_cache: Option<&TokenCache>,
    tx: &mpsc::Sender<Result<ClassifyResponse>>,
) -> Result<()> {
    loop {
        let idle_deadline = session.idle_deadline();

        tokio::select! {
            biased;

            () = tx.closed() => {
                tracing::debug!("Response consumer dropped, ending stream");
                return Ok(());
            }

            // A closed channel means the pump stopped without failing.
            Ok(err) = &mut *failure => return Err(err),

            next = responses.next() => match next {
                Some(Ok(response)) => {
                    let now = Instant::now();
                    if session.is_idle_at(now) {
                        tracing::debug!(
                            "No response for {:.1}s while input active, ending stream",
                            now.duration_since(session.last_response_time()).as_secs_f64()
                        );
                        return Ok(());
                    }
                    session.touch(now);

                    if let Some(err) = global_error(&response) {
                        return Err(err);
                    }

                    increment_responses();
                    if tx.send(Ok(response)).await.is_err() {
                        tracing::debug!("Response consumer dropped, ending stream");
                        return Ok(());
                    }
                }
                Some(Err(status)) => return status_outcome(status, token_cache, session),
                None => {
                    tracing::debug!(
                        "Persistent stream closed by server after {:.1}s",
                        session.elapsed().as_secs_f64()
                    );
                    return Ok(());
                }
            },

            () = idle_expiry(idle_deadline) => {
                let now = Instant::now();
                // The source may have been exhausted while waiting.
                if session.is_idle_at(now) {
                    tracing::debug!(
                        "No response for {:.1}s while input active, ending stream",
                        now.duration_since(session.last_response_time()).as_secs_f64()
                    );
                    return Ok(());
                }
            }
        }
    }
}

/// Pulls batches and writes them to the request stream until cancelled, the
/// transport stops reading, or the batcher fails. Always shuts the batcher
/// down before returning.
async fn pump_batches<B: Batcher>(
    mut batcher: B,
    requests: mpsc::Sender<ClassifyRequest>,
    failure: oneshot::Sender<Error>,
    shutdown: CancellationToken,
) {
    let failed = loop {
        let batch = tokio::select! {
            biased;
            () = shutdown.cancelled() => break None,
            batch = batcher.next_batch() => batch,
        };

        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => break Some(e),
        };

        if batch.is_keepalive() {
            increment_keepalives_sent();
            tracing::trace!("Sending keepalive");
        } else {
            increment_batches_sent(batch.len() as u64);
            tracing::debug!("Sending batch of {} items", batch.len());
        }

        let sent = tokio::select! {
            biased;
            () = shutdown.cancelled() => break None,
            sent = requests.send(batch.into()) => sent,
        };

        if sent.is_err() {
            tracing::debug!("Request stream closed, stopping batch pump");
            break None;
        }
    };

    if let Some(e) = failed {
        if failure.send(e).is_err() {
            tracing::debug!("Batch failure raised after the stream ended");
        }
    }

    batcher.shutdown().await;
}

async fn idle_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

fn global_error(response: &ClassifyResponse) -> Option<Error> {
    response
        .global_error
        .as_ref()
        .filter(|err| !err.message.is_empty())
        .map(|err| Error::Classification {
            code: err.code,
            message: err.message.clone(),
            details: err.details.clone(),
        })
}

/// Maps a transport status to a stream outcome.
///
/// Token failures raised by the credential hook are surfaced; every other
/// status ends the stream cleanly.
fn status_outcome(
    status: Status,
    token_cache: Option<&TokenCache>,
    session: &StreamSession,
) -> Result<()> {
    if status.code() == Code::Unauthenticated {
        if let Some(cache) = token_cache {
            cache.invalidate();
        }
    }

    if let Some(oauth) = Error::oauth_from_status(&status) {
        return Err(Error::OAuth(oauth));
    }

    tracing::debug!(
        "Persistent stream ended after {:.1}s ({:?}: {})",
        session.elapsed().as_secs_f64(),
        status.code(),
        status.message()
    );
    Ok(())
}
