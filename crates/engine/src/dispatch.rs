//! Chunk dispatcher
//!
//! Issues one classifier call per chunk, bounded by a semaphore, and emits
//! protocol events as chunks start, deliver results, and complete. Chunk
//! completions race, so cross-chunk event order is unspecified; within one
//! chunk the `chunk_start` → `result` → `chunk_complete` order always holds.
//!
//! A chunk-level failure is reported as a chunk-scoped error event and never
//! cancels sibling chunks: one bad chunk must not discard good results from
//! the others. The cancellation token is honored at every suspension point;
//! once cancelled, no further events are emitted and no terminal event is
//! produced.

use crate::chunk::{Chunk, ChunkPlan};
use crate::event::StreamEvent;
use futures::Future;
use partforge_common::config::DispatchConfig;
use partforge_common::errors::AppError;
use partforge_common::metrics::METRICS_PREFIX;
use partforge_common::model::PartQuery;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dispatcher tuning knobs
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Upper bound on concurrently in-flight chunk requests
    pub max_concurrent_chunks: usize,
    /// Event channel capacity
    pub event_buffer: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_concurrent_chunks: 5,
            event_buffer: 64,
        }
    }
}

impl From<&DispatchConfig> for DispatcherSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_concurrent_chunks: config.max_concurrent_chunks.max(1),
            event_buffer: config.event_buffer.max(1),
        }
    }
}

/// Runs one enrichment job's chunk fan-out
pub struct Dispatcher {
    settings: DispatcherSettings,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(settings: DispatcherSettings, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    /// Dispatch every chunk of `plan` through `lookup` and stream events.
    ///
    /// The returned receiver yields exactly one `start` first and, unless the
    /// job is cancelled or the receiver is dropped, exactly one `complete`
    /// last. Dropping the receiver tears the job down: pending sends fail and
    /// workers unwind without issuing further classifier calls.
    pub fn run<R, F, Fut>(&self, plan: ChunkPlan, lookup: F) -> mpsc::Receiver<StreamEvent<R>>
    where
        R: Clone + Send + 'static,
        F: Fn(Vec<PartQuery>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<Vec<R>, AppError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.settings.event_buffer);
        let cancel = self.cancel.clone();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_chunks));

        tokio::spawn(async move {
            let total_chunks = plan.total_chunks();
            let total_skipped = plan.total_skipped();

            let start = StreamEvent::Start {
                total_records: plan.total_records,
                total_chunks,
                total_skipped,
            };
            if tx.send(start).await.is_err() {
                debug!("Consumer gone before start event");
                return;
            }

            let mut workers = JoinSet::new();
            for chunk in plan.chunks {
                workers.spawn(process_chunk(
                    chunk,
                    lookup.clone(),
                    tx.clone(),
                    semaphore.clone(),
                    cancel.clone(),
                ));
            }

            let mut accumulated: Vec<R> = Vec::new();
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(Some(results)) => accumulated.extend(results),
                    // Chunk failed or was cancelled; any error event was
                    // already emitted by the worker itself.
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Chunk worker panicked"),
                }
            }

            if cancel.is_cancelled() {
                debug!("Job cancelled, suppressing terminal event");
                return;
            }

            let complete = StreamEvent::Complete {
                total_analyzed: accumulated.len(),
                total_skipped,
                results: accumulated,
            };
            let _ = tx.send(complete).await;
        });

        rx
    }
}

/// Process a single chunk: emit its start marker, call the classifier, emit
/// its results or a chunk-scoped error, then its completion marker.
///
/// Returns the chunk's results for terminal accumulation, or `None` when the
/// chunk failed, was cancelled, or lost its consumer.
async fn process_chunk<R, F, Fut>(
    chunk: Chunk,
    lookup: F,
    tx: mpsc::Sender<StreamEvent<R>>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Option<Vec<R>>
where
    R: Clone + Send + 'static,
    F: Fn(Vec<PartQuery>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Vec<R>, AppError>> + Send + 'static,
{
    let _permit = tokio::select! {
        _ = cancel.cancelled() => return None,
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return None,
        },
    };

    let ordinal = chunk.ordinal;
    let total_chunks = chunk.total_chunks;
    let records_in_chunk = chunk.parts.len();

    let started = StreamEvent::ChunkStart {
        chunk: ordinal,
        total_chunks,
        records_in_chunk,
    };
    if tx.send(started).await.is_err() {
        return None;
    }

    metrics::counter!(format!("{}_chunks_dispatched_total", METRICS_PREFIX)).increment(1);

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(chunk = ordinal, "Chunk abandoned by cancellation");
            return None;
        }
        outcome = lookup(chunk.parts) => outcome,
    };

    let results = match outcome {
        Ok(results) => {
            debug!(
                chunk = ordinal,
                result_count = results.len(),
                "Chunk classified"
            );
            let event = StreamEvent::Result {
                chunk: ordinal,
                results: results.clone(),
            };
            if tx.send(event).await.is_err() {
                return None;
            }
            Some(results)
        }
        Err(e) => {
            warn!(chunk = ordinal, error = %e, "Chunk classification failed");
            metrics::counter!(format!("{}_chunks_failed_total", METRICS_PREFIX)).increment(1);
            let event = StreamEvent::Error {
                message: e.to_string(),
                chunk: Some(ordinal),
            };
            if tx.send(event).await.is_err() {
                return None;
            }
            None
        }
    };

    let completed = StreamEvent::ChunkComplete {
        chunk: ordinal,
        total_chunks,
    };
    if tx.send(completed).await.is_err() {
        return None;
    }

    results
}
