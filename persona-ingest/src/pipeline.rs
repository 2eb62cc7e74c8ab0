//! Fetch / Handle / Respond-Error ingestion pipeline.
//!
//! Three tasks connected by two bounded queues:
//!
//! ```text
//! EventSource -> fetch -> [messages] -> handle -> PersonCreator
//!                  |                       |
//!                  +------> [errors] <-----+
//!                              |
//!                        respond-error -> ErrorSink
//! ```
//!
//! - fetch decodes each payload. Undecodable payloads go to the error queue
//!   and never reach handle. A full message queue blocks fetch.
//! - handle validates the identity and calls the creator once. Invalid
//!   messages and failed creations go to the error queue. No retries.
//! - respond-error publishes each report with bounded retry on transient
//!   broker errors. Reports that still fail are logged and dropped.
//!
//! Shutdown is a `watch` flag observed by every stage between units of
//! work: before the next read, before taking the next message or report,
//! and during publish backoff. A creation or publish attempt already in
//! flight runs to completion under its own deadline. Reports that cannot be
//! delivered once shutdown is requested are counted as dropped. When the
//! stream ends instead, the queues close in order and the pipeline drains
//! before the tasks exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use persona_core::PersonCreator;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::broker::{BrokerError, ErrorSink, EventSource};
use crate::config::IngestConfig;
use crate::message::{FioErrorMessage, FioMessage};

// ============================================================================
// METRICS
// ============================================================================

/// Stage counters, shared by the three tasks.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Messages read from the event source
    pub fetched: AtomicU64,
    /// Payloads that were not valid JSON messages
    pub decode_failures: AtomicU64,
    /// Read errors that stopped the fetch stage
    pub read_failures: AtomicU64,
    /// Persons created
    pub created: AtomicU64,
    /// Messages rejected by identity validation
    pub rejected: AtomicU64,
    /// Creations that returned an error
    pub creation_failures: AtomicU64,
    /// Error reports published
    pub errors_published: AtomicU64,
    /// Publish attempts retried after a transient failure
    pub publish_retries: AtomicU64,
    /// Error reports given up on or abandoned at shutdown
    pub errors_dropped: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            errors_published: self.errors_published.load(Ordering::Relaxed),
            publish_retries: self.publish_retries.load(Ordering::Relaxed),
            errors_dropped: self.errors_dropped.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of ingest metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub fetched: u64,
    pub decode_failures: u64,
    pub read_failures: u64,
    pub created: u64,
    pub rejected: u64,
    pub creation_failures: u64,
    pub errors_published: u64,
    pub publish_retries: u64,
    pub errors_dropped: u64,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Publish policy for the respond-error stage.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
    timeout: Duration,
}

/// Running pipeline: the three stage tasks and their shared metrics.
pub struct IngestPipeline {
    fetch: JoinHandle<()>,
    handle: JoinHandle<()>,
    respond: JoinHandle<()>,
    metrics: Arc<IngestMetrics>,
}

impl IngestPipeline {
    /// Spawn the three stages on the current runtime.
    ///
    /// The pipeline stops when `shutdown` becomes `true` (or its sender is
    /// dropped), or on its own once the event source ends and both queues
    /// have drained.
    pub fn spawn<S, K, C>(
        config: &IngestConfig,
        source: S,
        sink: K,
        creator: Arc<C>,
        shutdown: watch::Receiver<bool>,
    ) -> Self
    where
        S: EventSource + 'static,
        K: ErrorSink + 'static,
        C: PersonCreator + ?Sized + 'static,
    {
        let metrics = Arc::new(IngestMetrics::new());
        let (msg_tx, msg_rx) = mpsc::channel::<FioMessage>(config.buffer_size.max(1));
        let (err_tx, err_rx) = mpsc::channel::<FioErrorMessage>(config.error_buffer_size.max(1));
        let policy = RetryPolicy {
            attempts: config.publish_attempts.max(1),
            backoff: config.retry_backoff,
            timeout: config.publish_timeout,
        };

        tracing::info!(
            buffer_size = config.buffer_size.max(1),
            error_buffer_size = config.error_buffer_size.max(1),
            publish_attempts = policy.attempts,
            "Ingest pipeline started"
        );

        let respond = tokio::spawn(respond_error_stage(
            sink,
            err_rx,
            policy,
            shutdown.clone(),
            metrics.clone(),
        ));
        let handle = tokio::spawn(handle_stage(
            creator,
            msg_rx,
            err_tx.clone(),
            shutdown.clone(),
            metrics.clone(),
        ));
        let fetch = tokio::spawn(fetch_stage(
            source,
            msg_tx,
            err_tx,
            shutdown,
            metrics.clone(),
        ));

        Self {
            fetch,
            handle,
            respond,
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        self.metrics.clone()
    }

    /// Wait for every stage to finish and return the final counters.
    pub async fn join(self) -> IngestSnapshot {
        for (stage, task) in [
            ("fetch", self.fetch),
            ("handle", self.handle),
            ("respond-error", self.respond),
        ] {
            if let Err(e) = task.await {
                tracing::error!(stage, error = %e, "Ingest stage panicked");
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            fetched = snapshot.fetched,
            created = snapshot.created,
            rejected = snapshot.rejected,
            decode_failures = snapshot.decode_failures,
            creation_failures = snapshot.creation_failures,
            errors_published = snapshot.errors_published,
            errors_dropped = snapshot.errors_dropped,
            "Ingest pipeline completed"
        );
        snapshot
    }
}

/// Resolve once shutdown is requested or the controller is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Queue an error report. Returns `false` if the stage should stop.
///
/// A report that cannot be queued because the error stage is gone, or
/// because shutdown arrived while the queue was full, is counted as dropped.
async fn report(
    err_tx: &mpsc::Sender<FioErrorMessage>,
    report: FioErrorMessage,
    shutdown: &mut watch::Receiver<bool>,
    metrics: &IngestMetrics,
) -> bool {
    let report = match err_tx.try_send(report) {
        Ok(()) => return true,
        Err(mpsc::error::TrySendError::Closed(report)) => {
            bump(&metrics.errors_dropped);
            tracing::warn!(msg = %report.message, "Error queue closed, report lost");
            return false;
        }
        Err(mpsc::error::TrySendError::Full(report)) => report,
    };

    let message = report.message.clone();
    tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => {
            bump(&metrics.errors_dropped);
            tracing::warn!(msg = %message, "Shutdown with error queue full, report dropped");
            false
        }
        sent = err_tx.send(report) => {
            if sent.is_err() {
                bump(&metrics.errors_dropped);
                tracing::warn!(msg = %message, "Error queue closed, report lost");
                return false;
            }
            true
        }
    }
}

// ============================================================================
// STAGES
// ============================================================================

async fn fetch_stage<S: EventSource>(
    mut source: S,
    msg_tx: mpsc::Sender<FioMessage>,
    err_tx: mpsc::Sender<FioErrorMessage>,
    mut shutdown: watch::Receiver<bool>,
    metrics: Arc<IngestMetrics>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                tracing::info!("Fetch stage shutting down");
                break;
            }
            next = source.next_message() => next,
        };

        let raw = match next {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::info!("Event stream ended");
                break;
            }
            Err(e) => {
                bump(&metrics.read_failures);
                tracing::error!(error = %e, "Event stream read failed, stopping fetch");
                break;
            }
        };
        bump(&metrics.fetched);
        tracing::debug!(
            topic = %raw.topic,
            partition = raw.partition,
            offset = raw.offset,
            bytes = raw.payload.len(),
            "Fetched message"
        );

        match FioMessage::decode(&raw.payload) {
            Ok(msg) => {
                let sent = tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut shutdown) => break,
                    sent = msg_tx.send(msg) => sent,
                };
                if sent.is_err() {
                    tracing::warn!("Message queue closed, stopping fetch");
                    break;
                }
            }
            Err(e) => {
                bump(&metrics.decode_failures);
                tracing::warn!(offset = raw.offset, error = %e, "Undecodable message");
                let failed = FioErrorMessage::new(FioMessage::default(), e);
                if !report(&err_tx, failed, &mut shutdown, &metrics).await {
                    break;
                }
            }
        }
    }

    drop(msg_tx);
    if let Err(e) = source.close().await {
        tracing::warn!(error = %e, "Failed to close event source");
    }
}

async fn handle_stage<C: PersonCreator + ?Sized>(
    creator: Arc<C>,
    mut msg_rx: mpsc::Receiver<FioMessage>,
    err_tx: mpsc::Sender<FioErrorMessage>,
    mut shutdown: watch::Receiver<bool>,
    metrics: Arc<IngestMetrics>,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                tracing::info!("Handle stage shutting down");
                break;
            }
            msg = msg_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let identity = match msg.to_identity() {
            Ok(identity) => identity,
            Err(e) => {
                bump(&metrics.rejected);
                tracing::info!(msg = %msg, error = %e, "Invalid identity");
                let failed = FioErrorMessage::new(msg, e);
                if !report(&err_tx, failed, &mut shutdown, &metrics).await {
                    break;
                }
                continue;
            }
        };

        // Runs to completion under the store and lookup deadlines. Shutdown
        // is only observed between messages.
        match creator.create_from(&identity).await {
            Ok(person_id) => {
                bump(&metrics.created);
                tracing::info!(person_id = %person_id, identity = %identity, "Person created");
            }
            Err(e) => {
                bump(&metrics.creation_failures);
                tracing::warn!(
                    identity = %identity,
                    error = %e,
                    transient = e.is_transient(),
                    "Person creation failed"
                );
                let failed = FioErrorMessage::new(msg, e);
                if !report(&err_tx, failed, &mut shutdown, &metrics).await {
                    break;
                }
            }
        }
    }

    msg_rx.close();
    let mut abandoned = 0u64;
    while msg_rx.try_recv().is_ok() {
        abandoned += 1;
    }
    if abandoned > 0 {
        tracing::warn!(abandoned, "Queued messages left unhandled at shutdown");
    }
}

async fn respond_error_stage<K: ErrorSink>(
    mut sink: K,
    mut err_rx: mpsc::Receiver<FioErrorMessage>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
    metrics: Arc<IngestMetrics>,
) {
    'reports: loop {
        let failed = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                tracing::info!("Respond-error stage shutting down");
                break;
            }
            failed = err_rx.recv() => match failed {
                Some(failed) => failed,
                None => break,
            },
        };

        let payload = match failed.encode() {
            Ok(payload) => payload,
            Err(e) => {
                bump(&metrics.errors_dropped);
                tracing::error!(error = %e, "Failed to encode error report");
                continue;
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let published = tokio::time::timeout(policy.timeout, sink.publish(&payload))
                .await
                .unwrap_or(Err(BrokerError::DeadlineExceeded));

            match published {
                Ok(()) => {
                    bump(&metrics.errors_published);
                    tracing::debug!(msg = %failed.message, attempt, "Error report published");
                    break;
                }
                Err(e) if e.is_transient() && attempt < policy.attempts => {
                    bump(&metrics.publish_retries);
                    tracing::info!(attempt, error = %e, "Transient publish failure, retrying");
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => {
                            bump(&metrics.errors_dropped);
                            tracing::warn!(
                                msg = %failed.message,
                                attempt,
                                "Shutdown during publish backoff, report dropped"
                            );
                            break 'reports;
                        }
                        _ = tokio::time::sleep(policy.backoff) => {}
                    }
                }
                Err(e) => {
                    bump(&metrics.errors_dropped);
                    tracing::error!(
                        msg = %failed.message,
                        attempt,
                        error = %e,
                        "Dropping error report"
                    );
                    break;
                }
            }
        }
    }

    err_rx.close();
    while let Ok(abandoned) = err_rx.try_recv() {
        bump(&metrics.errors_dropped);
        tracing::warn!(msg = %abandoned.message, "Error report abandoned at shutdown");
    }

    if let Err(e) = sink.close().await {
        tracing::warn!(error = %e, "Failed to close error sink");
    }
}
