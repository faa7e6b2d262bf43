//! PartForge Streaming Consumer
//!
//! The receiving side of the enrichment protocol. Posts a record set to the
//! gateway, reads the framed event stream off the response body, and folds
//! every event into a caller-owned job. The job keeps whatever was merged
//! even when the stream dies or the caller cancels; a stream that ends
//! without a terminal event leaves the job failed, never silently complete.

pub mod sse;

use futures::{Stream, StreamExt};
use partforge_common::errors::{AppError, Result};
use partforge_common::model::{ClassificationResult, PartRecord, ReplacementResult};
use partforge_engine::event::{decode_frame, StreamEvent};
use partforge_engine::job::EnrichmentJob;
use partforge_engine::replacement::{is_replacement_eligible, ReplacementJob};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sse::FrameDecoder;

/// Where a job's events get folded; implemented by both job kinds
trait EventSink {
    type Item: DeserializeOwned;

    fn apply(&mut self, event: StreamEvent<Self::Item>);
    fn finish_stream(&mut self);
    fn cancel(&mut self);
}

impl EventSink for EnrichmentJob {
    type Item = ClassificationResult;

    fn apply(&mut self, event: StreamEvent<Self::Item>) {
        self.apply_event(event);
    }

    fn finish_stream(&mut self) {
        EnrichmentJob::finish_stream(self);
    }

    fn cancel(&mut self) {
        EnrichmentJob::cancel(self);
    }
}

impl EventSink for ReplacementJob {
    type Item = ReplacementResult;

    fn apply(&mut self, event: StreamEvent<Self::Item>) {
        self.apply_event(event);
    }

    fn finish_stream(&mut self) {
        ReplacementJob::finish_stream(self);
    }

    fn cancel(&mut self) {
        ReplacementJob::cancel(self);
    }
}

/// Client for the gateway's streaming enrichment endpoints
pub struct EnrichmentClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    parts: &'a [PartRecord],
    stream: bool,
}

impl EnrichmentClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Run a classification job over `records`.
    ///
    /// Returns the job in whatever terminal state the run reached:
    /// `completed`, `cancelled` (via `cancel`), or `failed` on a transport
    /// error — with all results merged so far intact.
    pub async fn analyze(
        &self,
        records: Vec<PartRecord>,
        cancel: &CancellationToken,
    ) -> Result<EnrichmentJob> {
        if records.is_empty() {
            return Err(AppError::Validation {
                message: "No parts provided".to_string(),
                field: Some("parts".to_string()),
            });
        }

        let response = self.open_stream("/v1/analyze", &records).await?;
        let mut job = EnrichmentJob::new(records);
        consume_stream(&mut job, Box::pin(response.bytes_stream()), cancel).await;
        Ok(job)
    }

    /// Run a replacement job over the obsolete subset of `records`.
    ///
    /// Fails fast, before opening any stream, when no record is currently
    /// classified obsolete.
    pub async fn find_replacements(
        &self,
        records: Vec<PartRecord>,
        cancel: &CancellationToken,
    ) -> Result<ReplacementJob> {
        if !records.iter().any(is_replacement_eligible) {
            return Err(AppError::NoEligibleParts {
                operation: "replacement search".to_string(),
            });
        }

        let response = self.open_stream("/v1/replacements", &records).await?;
        let mut job = ReplacementJob::new(records);
        consume_stream(&mut job, Box::pin(response.bytes_stream()), cancel).await;
        Ok(job)
    }

    async fn open_stream(&self, path: &str, parts: &[PartRecord]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(&StreamRequest { parts, stream: true })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body)
                .unwrap_or_else(|| format!("HTTP {} from {}", status, url));
            return Err(if status.is_client_error() {
                AppError::Validation {
                    message,
                    field: None,
                }
            } else {
                AppError::Internal { message }
            });
        }

        Ok(response)
    }
}

/// Pull the human-readable message out of a gateway error body
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

/// Drive one event stream into a job until a terminal event, stream end,
/// transport error, or cancellation — whichever comes first.
async fn consume_stream<J, S, B, E>(job: &mut J, mut body: S, cancel: &CancellationToken)
where
    J: EventSink,
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = FrameDecoder::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Consumer cancelled, tearing down stream");
                job.cancel();
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                let frames = match decoder.push(bytes.as_ref()) {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(error = %e, "Corrupt frame, treating stream as dead");
                        job.finish_stream();
                        return;
                    }
                };

                for frame in frames {
                    let event: StreamEvent<J::Item> = match decode_frame(&frame) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "Undecodable event, treating stream as dead");
                            job.finish_stream();
                            return;
                        }
                    };

                    let terminal = event.is_terminal();
                    job.apply(event);
                    if terminal {
                        // The gateway closes the stream right after; nothing
                        // left to read.
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Transport error mid-stream");
                job.finish_stream();
                return;
            }
            None => {
                job.finish_stream();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partforge_common::model::{Confidence, LifecycleStatus};
    use partforge_engine::job::JobState;

    fn record(manufacturer: &str, part_number: &str, stocking: &str) -> PartRecord {
        PartRecord {
            part_manufacturer: manufacturer.to_string(),
            manufacturer_part_number: part_number.to_string(),
            stocking_decision: stocking.to_string(),
            ..Default::default()
        }
    }

    fn frame<R: Serialize>(event: &StreamEvent<R>) -> Vec<u8> {
        event.to_frame().unwrap().into_bytes()
    }

    fn body_from(frames: Vec<Vec<u8>>) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> + Unpin {
        futures::stream::iter(frames.into_iter().map(Ok))
    }

    fn classification(part_number: &str) -> ClassificationResult {
        ClassificationResult {
            manufacturer: "BANNER".into(),
            part_number: part_number.to_string(),
            ai_status: LifecycleStatus::Active,
            notes_by_ai: "in production".into(),
            ai_confidence: Confidence::High,
        }
    }

    #[tokio::test]
    async fn test_stream_drives_job_to_completion() {
        let mut job = EnrichmentJob::new(vec![
            record("Banner", "45136", "Yes"),
            record("Omron", "E3Z", "No"),
        ]);

        let events: Vec<StreamEvent<ClassificationResult>> = vec![
            StreamEvent::Start { total_records: 2, total_chunks: 1, total_skipped: 1 },
            StreamEvent::ChunkStart { chunk: 1, total_chunks: 1, records_in_chunk: 1 },
            StreamEvent::Result { chunk: 1, results: vec![classification("45136")] },
            StreamEvent::ChunkComplete { chunk: 1, total_chunks: 1 },
            StreamEvent::Complete {
                total_analyzed: 1,
                total_skipped: 1,
                results: vec![classification("45136")],
            },
        ];
        let body = body_from(events.iter().map(frame).collect());

        consume_stream(&mut job, body, &CancellationToken::new()).await;

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.records()[0].ai_status, Some(LifecycleStatus::Active));
        assert_eq!(
            job.records()[1].ai_status,
            Some(LifecycleStatus::NotApplicable)
        );
    }

    #[tokio::test]
    async fn test_truncated_stream_fails_but_keeps_merges() {
        let mut job = EnrichmentJob::new(vec![
            record("Banner", "45136", "Yes"),
            record("SMC", "CDQ2B40", "Yes"),
        ]);

        let events: Vec<StreamEvent<ClassificationResult>> = vec![
            StreamEvent::Start { total_records: 2, total_chunks: 2, total_skipped: 0 },
            StreamEvent::Result { chunk: 1, results: vec![classification("45136")] },
            // connection drops here; no terminal event
        ];
        let body = body_from(events.iter().map(frame).collect());

        consume_stream(&mut job, body, &CancellationToken::new()).await;

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.records()[0].ai_status, Some(LifecycleStatus::Active));
        assert_eq!(job.records()[1].ai_status, None);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_is_fatal() {
        let mut job = EnrichmentJob::new(vec![record("Banner", "45136", "Yes")]);

        let start: StreamEvent<ClassificationResult> =
            StreamEvent::Start { total_records: 1, total_chunks: 1, total_skipped: 0 };
        let body = futures::stream::iter(vec![
            Ok(frame(&start)),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);

        consume_stream(&mut job, body, &CancellationToken::new()).await;
        assert_eq!(job.state(), JobState::Failed);
    }

    #[tokio::test]
    async fn test_cancellation_stops_consumption() {
        let mut job = EnrichmentJob::new(vec![record("Banner", "45136", "Yes")]);

        let cancel = CancellationToken::new();
        cancel.cancel();

        // An endless body; only cancellation can end the loop
        let start: StreamEvent<ClassificationResult> =
            StreamEvent::Start { total_records: 1, total_chunks: 1, total_skipped: 0 };
        let body = futures::stream::iter(
            std::iter::repeat(frame(&start)).map(Ok::<_, std::io::Error>),
        );
        futures::pin_mut!(body);

        consume_stream(&mut job, body, &cancel).await;
        assert_eq!(job.state(), JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_undecodable_event_is_fatal() {
        let mut job = EnrichmentJob::new(vec![record("Banner", "45136", "Yes")]);

        let body = body_from(vec![b"data: {\"type\":\"nonsense\"}\n\n".to_vec()]);
        consume_stream(&mut job, body, &CancellationToken::new()).await;
        assert_eq!(job.state(), JobState::Failed);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"code":"NO_ELIGIBLE_PARTS","message":"No parts eligible for replacement search"}}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("No parts eligible for replacement search")
        );
        assert_eq!(extract_error_message("not json"), None);
    }
}
