//! Request handlers

pub mod analyze;
pub mod health;
pub mod replacements;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use partforge_common::errors::{AppError, Result};
use partforge_common::metrics;
use partforge_engine::event::StreamEvent;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

/// Decrements the in-flight job gauge when the request ends, streaming or not
pub(crate) struct JobGuard;

impl JobGuard {
    pub(crate) fn start(kind: &str, total_records: usize, total_skipped: usize) -> Self {
        metrics::record_job_start(kind, total_records, total_skipped);
        Self
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        metrics::record_job_end();
    }
}

/// Turn a dispatcher event channel into an SSE response.
///
/// The cancellation drop-guard rides inside the stream: when the client
/// disconnects and axum drops the body, the guard cancels the job token and
/// in-flight classifier calls are abandoned rather than merely ignored.
pub(crate) fn sse_response<R>(
    mut rx: mpsc::Receiver<StreamEvent<R>>,
    cancel_guard: DropGuard,
    job_guard: JobGuard,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>
where
    R: Serialize + Send + 'static,
{
    let stream = async_stream::stream! {
        let _cancel_guard = cancel_guard;
        let _job_guard = job_guard;
        while let Some(event) = rx.recv().await {
            // Frames are plain `data:` frames; the discriminator lives in
            // the JSON body, matching the wire contract
            match Event::default().json_data(&event) {
                Ok(sse_event) => yield Ok::<_, Infallible>(sse_event),
                Err(e) => tracing::error!(error = %e, "Failed to encode stream event"),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Drain a dispatcher event channel to its terminal accumulation, for the
/// non-streaming mode.
pub(crate) async fn drain_results<R>(
    mut rx: mpsc::Receiver<StreamEvent<R>>,
) -> Result<(Vec<R>, usize, usize)> {
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Complete {
                total_analyzed,
                total_skipped,
                results,
            } => return Ok((results, total_analyzed, total_skipped)),
            StreamEvent::Error {
                message,
                chunk: None,
            } => return Err(AppError::Internal { message }),
            _ => {}
        }
    }

    Err(AppError::StreamClosed {
        message: "dispatcher ended without a terminal event".to_string(),
    })
}
