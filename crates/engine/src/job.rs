//! Enrichment job lifecycle
//!
//! A job owns the authoritative record set for one run and folds protocol
//! events into it: `create → apply_event* → finalize/cancel`. Merges happen
//! sequentially as events arrive off a single stream, so the record set
//! needs no locking here; feeding one job from two streams at once is the
//! caller's bug to avoid.

use crate::event::StreamEvent;
use crate::reconcile;
use partforge_common::model::{ClassificationResult, PartRecord};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Terminal and non-terminal job states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Counters mirrored from the event stream
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobProgress {
    pub total_records: usize,
    pub total_chunks: usize,
    pub total_skipped: usize,
    pub chunks_completed: usize,
    pub total_analyzed: usize,
}

impl JobProgress {
    pub fn percent(&self) -> f64 {
        if self.total_chunks == 0 {
            100.0
        } else {
            self.chunks_completed as f64 / self.total_chunks as f64 * 100.0
        }
    }
}

/// One classification run over a caller-owned record set
#[derive(Debug)]
pub struct EnrichmentJob {
    id: Uuid,
    records: Vec<PartRecord>,
    state: JobState,
    progress: JobProgress,
    last_error: Option<String>,
}

impl EnrichmentJob {
    pub fn new(records: Vec<PartRecord>) -> Self {
        let id = Uuid::new_v4();
        let total_records = records.len();
        debug!(job_id = %id, total_records, "Enrichment job created");
        Self {
            id,
            records,
            state: JobState::Running,
            progress: JobProgress {
                total_records,
                ..Default::default()
            },
            last_error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn records(&self) -> &[PartRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PartRecord> {
        self.records
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> &JobProgress {
        &self.progress
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.state != JobState::Running
    }

    /// Fold one protocol event into the record set.
    ///
    /// Events arriving after the job left `Running` are ignored: after
    /// cancellation or a fatal error no further merges occur, and whatever
    /// was merged before stays visible.
    pub fn apply_event(&mut self, event: StreamEvent<ClassificationResult>) {
        if self.state != JobState::Running {
            debug!(state = ?self.state, "Ignoring event for finished job");
            return;
        }

        match event {
            StreamEvent::Start {
                total_records,
                total_chunks,
                total_skipped,
            } => {
                self.progress.total_records = total_records;
                self.progress.total_chunks = total_chunks;
                self.progress.total_skipped = total_skipped;
                // Skipped records are finalized up front, before any results
                reconcile::finalize_skipped(&mut self.records);
            }

            StreamEvent::ChunkStart { chunk, .. } => {
                debug!(chunk, "Chunk processing started");
            }

            StreamEvent::ChunkComplete { chunk, .. } => {
                self.progress.chunks_completed += 1;
                debug!(
                    chunk,
                    completed = self.progress.chunks_completed,
                    total = self.progress.total_chunks,
                    "Chunk finished"
                );
            }

            StreamEvent::Result { chunk, results } => {
                let stats = reconcile::apply_classifications(&mut self.records, &results);
                debug!(
                    chunk,
                    merged = stats.merged,
                    unmatched = stats.unmatched,
                    "Incremental results merged"
                );
            }

            StreamEvent::Error {
                message,
                chunk: Some(chunk),
            } => {
                // Chunk-scoped: the job carries on with the other chunks
                warn!(chunk, error = %message, "Chunk failed, continuing");
            }

            StreamEvent::Error {
                message,
                chunk: None,
            } => {
                warn!(error = %message, "Job failed");
                self.last_error = Some(message);
                self.state = JobState::Failed;
            }

            StreamEvent::Complete {
                total_analyzed,
                total_skipped,
                results,
            } => {
                // Authoritative final pass; idempotent over the incremental
                // merges that preceded it.
                reconcile::apply_classifications(&mut self.records, &results);
                reconcile::finalize_skipped(&mut self.records);
                self.progress.total_analyzed = total_analyzed;
                self.progress.total_skipped = total_skipped;
                self.state = JobState::Completed;
            }
        }
    }

    /// Mark the end of the event stream. A job still `Running` at that point
    /// never saw its terminal event: the transport died, which is fatal. The
    /// results merged so far are kept.
    pub fn finish_stream(&mut self) {
        if self.state == JobState::Running {
            warn!("Stream ended without a terminal event");
            self.state = JobState::Failed;
            self.last_error
                .get_or_insert_with(|| "stream ended without a terminal event".to_string());
        }
    }

    /// Cooperative cancellation: no further merges, merged values retained
    pub fn cancel(&mut self) {
        if self.state == JobState::Running {
            self.state = JobState::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partforge_common::model::{Confidence, LifecycleStatus};

    fn record(manufacturer: &str, part_number: &str, stocking: &str) -> PartRecord {
        PartRecord {
            part_manufacturer: manufacturer.to_string(),
            manufacturer_part_number: part_number.to_string(),
            stocking_decision: stocking.to_string(),
            ..Default::default()
        }
    }

    fn result(manufacturer: &str, part_number: &str) -> ClassificationResult {
        ClassificationResult {
            manufacturer: manufacturer.to_string(),
            part_number: part_number.to_string(),
            ai_status: LifecycleStatus::Active,
            notes_by_ai: "verified".into(),
            ai_confidence: Confidence::High,
        }
    }

    fn start_event(total_records: usize, total_chunks: usize, total_skipped: usize)
        -> StreamEvent<ClassificationResult>
    {
        StreamEvent::Start {
            total_records,
            total_chunks,
            total_skipped,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut job = EnrichmentJob::new(vec![
            record("Banner", "45136", "Yes"),
            record("Omron", "E3Z", "No"),
        ]);

        job.apply_event(start_event(2, 1, 1));
        // The skipped record is finalized before any results arrive
        assert_eq!(job.records()[1].ai_status, Some(LifecycleStatus::NotApplicable));

        job.apply_event(StreamEvent::ChunkStart {
            chunk: 1,
            total_chunks: 1,
            records_in_chunk: 1,
        });
        job.apply_event(StreamEvent::Result {
            chunk: 1,
            results: vec![result("BANNER", "45136")],
        });
        job.apply_event(StreamEvent::ChunkComplete { chunk: 1, total_chunks: 1 });
        job.apply_event(StreamEvent::Complete {
            total_analyzed: 1,
            total_skipped: 1,
            results: vec![result("BANNER", "45136")],
        });

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.records()[0].ai_status, Some(LifecycleStatus::Active));
        assert_eq!(job.progress().total_analyzed, 1);
        assert_eq!(job.progress().percent(), 100.0);
    }

    #[test]
    fn test_incremental_then_complete_converges() {
        let records = vec![record("Banner", "45136", "Yes"), record("SMC", "CDQ2B40", "Yes")];
        let results = vec![result("BANNER", "45136"), result("SMC", "CDQ2B40")];

        let mut incremental = EnrichmentJob::new(records.clone());
        incremental.apply_event(start_event(2, 1, 0));
        incremental.apply_event(StreamEvent::Result { chunk: 1, results: results.clone() });
        incremental.apply_event(StreamEvent::Complete {
            total_analyzed: 2,
            total_skipped: 0,
            results: results.clone(),
        });

        let mut complete_only = EnrichmentJob::new(records);
        complete_only.apply_event(start_event(2, 1, 0));
        complete_only.apply_event(StreamEvent::Complete {
            total_analyzed: 2,
            total_skipped: 0,
            results,
        });

        for (a, b) in incremental.records().iter().zip(complete_only.records()) {
            assert_eq!(a.ai_status, b.ai_status);
            assert_eq!(a.notes_by_ai, b.notes_by_ai);
        }
    }

    #[test]
    fn test_chunk_error_is_not_fatal() {
        let mut job = EnrichmentJob::new(vec![record("Banner", "45136", "Yes")]);
        job.apply_event(start_event(1, 1, 0));
        job.apply_event(StreamEvent::Error {
            message: "classifier timeout".into(),
            chunk: Some(1),
        });
        assert_eq!(job.state(), JobState::Running);
    }

    #[test]
    fn test_fatal_error_keeps_merged_results() {
        let mut job = EnrichmentJob::new(vec![
            record("Banner", "45136", "Yes"),
            record("SMC", "CDQ2B40", "Yes"),
        ]);
        job.apply_event(start_event(2, 2, 0));
        job.apply_event(StreamEvent::Result {
            chunk: 1,
            results: vec![result("BANNER", "45136")],
        });
        job.apply_event(StreamEvent::Error {
            message: "upstream connection reset".into(),
            chunk: None,
        });

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.last_error(), Some("upstream connection reset"));
        // Partial results remain visible
        assert_eq!(job.records()[0].ai_status, Some(LifecycleStatus::Active));
        assert_eq!(job.records()[1].ai_status, None);
    }

    #[test]
    fn test_truncated_stream_is_fatal() {
        let mut job = EnrichmentJob::new(vec![record("Banner", "45136", "Yes")]);
        job.apply_event(start_event(1, 1, 0));
        job.finish_stream();
        assert_eq!(job.state(), JobState::Failed);

        // A completed job is untouched by finish_stream
        let mut done = EnrichmentJob::new(vec![record("Banner", "45136", "Yes")]);
        done.apply_event(start_event(1, 1, 0));
        done.apply_event(StreamEvent::Complete {
            total_analyzed: 1,
            total_skipped: 0,
            results: vec![result("BANNER", "45136")],
        });
        done.finish_stream();
        assert_eq!(done.state(), JobState::Completed);
    }

    #[test]
    fn test_no_merges_after_cancellation() {
        let mut job = EnrichmentJob::new(vec![
            record("Banner", "45136", "Yes"),
            record("SMC", "CDQ2B40", "Yes"),
        ]);
        job.apply_event(start_event(2, 2, 0));
        job.apply_event(StreamEvent::Result {
            chunk: 1,
            results: vec![result("BANNER", "45136")],
        });

        job.cancel();
        assert_eq!(job.state(), JobState::Cancelled);

        // A straggler event after cancellation changes nothing
        job.apply_event(StreamEvent::Result {
            chunk: 2,
            results: vec![result("SMC", "CDQ2B40")],
        });
        assert_eq!(job.records()[0].ai_status, Some(LifecycleStatus::Active));
        assert_eq!(job.records()[1].ai_status, None);
        assert_eq!(job.state(), JobState::Cancelled);
    }
}
