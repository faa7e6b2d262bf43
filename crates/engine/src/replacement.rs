//! Replacement correlation
//!
//! A second run of the dispatch/reconcile machinery, scoped to the records
//! already classified obsolete. The match key differs: results answer with
//! the obsolete part number (falling back to the echoed part number), records
//! offer their manufacturer part number (falling back to the AI-corrected
//! spelling). The merged field set is the replacement block, disjoint from
//! the classification fields.

use crate::chunk::{Chunk, ChunkPlan};
use crate::event::StreamEvent;
use crate::job::{JobProgress, JobState};
use crate::normalize::{keys_match, normalize};
use partforge_common::metrics;
use partforge_common::model::{LifecycleStatus, PartQuery, PartRecord, ReplacementResult};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::reconcile::MergeStats;

/// Replacement search only concerns records currently classified obsolete
pub fn is_replacement_eligible(record: &PartRecord) -> bool {
    record.ai_status == Some(LifecycleStatus::Obsolete)
}

/// The identity pair sent to the replacement finder for one obsolete record
fn replacement_query(record: &PartRecord) -> PartQuery {
    let manufacturer = if record.part_manufacturer.trim().is_empty() {
        record.manufacturer.clone()
    } else {
        record.part_manufacturer.clone()
    };
    let part_number = if record.manufacturer_part_number.trim().is_empty() {
        record.part_number_ai_modified.clone()
    } else {
        record.manufacturer_part_number.clone()
    };
    PartQuery {
        manufacturer,
        part_number,
    }
}

/// Partition records for a replacement run: obsolete records are chunked,
/// everything else is set aside. Chunking is order-preserving exactly as in
/// the classification run.
pub fn partition_for_replacement(records: &[PartRecord], chunk_size: usize) -> ChunkPlan {
    assert!(chunk_size > 0, "chunk_size must be positive");

    let mut eligible = Vec::new();
    let mut skipped = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if is_replacement_eligible(record) {
            eligible.push(replacement_query(record));
        } else {
            skipped.push(index);
        }
    }

    let total_chunks = eligible.len().div_ceil(chunk_size);
    let chunks = eligible
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, parts)| Chunk {
            ordinal: (i + 1) as u32,
            total_chunks,
            parts: parts.to_vec(),
        })
        .collect();

    ChunkPlan {
        chunks,
        skipped,
        total_records: records.len(),
    }
}

/// Merge one payload of replacement suggestions into `records`.
///
/// A result's key is its obsolete part number, falling back to its echoed
/// part number when that is blank; a record offers its manufacturer part
/// number with the AI-corrected spelling as fallback. First match wins, one
/// result per record per call, unmatched results are dropped with a log.
pub fn apply_replacements(
    records: &mut [PartRecord],
    results: &[ReplacementResult],
) -> MergeStats {
    let keys: Vec<String> = results
        .iter()
        .map(|r| {
            let primary = normalize(&r.obsolete_part_number);
            if primary.is_empty() {
                normalize(&r.part_number)
            } else {
                primary
            }
        })
        .collect();
    let mut consumed = vec![false; results.len()];
    let mut stats = MergeStats::default();

    for record in records.iter_mut() {
        if !is_replacement_eligible(record) {
            continue;
        }

        let primary = normalize(&record.manufacturer_part_number);
        let fallback = normalize(&record.part_number_ai_modified);

        let matched = keys
            .iter()
            .position(|key| keys_match(key, &primary) || keys_match(key, &fallback));

        if let Some(index) = matched {
            let result = &results[index];
            record.recommended_replacement = result.recommended_replacement.clone();
            record.replacement_manufacturer = result.replacement_manufacturer.clone();
            record.replacement_price = result.price;
            record.replacement_currency = result.currency.clone();
            record.replacement_source_type = result.source_type.clone();
            record.replacement_source_url = result.source_url.clone();
            record.replacement_notes = result.notes.clone();
            record.replacement_confidence = result.ai_confidence;
            consumed[index] = true;
            stats.merged += 1;
        }
    }

    for (index, result) in results.iter().enumerate() {
        if !consumed[index] {
            stats.unmatched += 1;
            debug!(
                obsolete_part_number = %result.obsolete_part_number,
                part_number = %result.part_number,
                "Dropping replacement with no matching record"
            );
        }
    }

    metrics::record_merge(stats.merged, stats.unmatched);
    stats
}

/// One replacement run over a caller-owned record set
#[derive(Debug)]
pub struct ReplacementJob {
    id: Uuid,
    records: Vec<PartRecord>,
    state: JobState,
    progress: JobProgress,
    last_error: Option<String>,
}

impl ReplacementJob {
    pub fn new(records: Vec<PartRecord>) -> Self {
        let id = Uuid::new_v4();
        let total_records = records.len();
        debug!(job_id = %id, total_records, "Replacement job created");
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

    /// Fold one protocol event into the record set; same state machine as
    /// the classification job, with the replacement merge policy.
    pub fn apply_event(&mut self, event: StreamEvent<ReplacementResult>) {
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
            }

            StreamEvent::ChunkStart { chunk, .. } => {
                debug!(chunk, "Replacement chunk started");
            }

            StreamEvent::ChunkComplete { .. } => {
                self.progress.chunks_completed += 1;
            }

            StreamEvent::Result { chunk, results } => {
                let stats = apply_replacements(&mut self.records, &results);
                debug!(
                    chunk,
                    merged = stats.merged,
                    unmatched = stats.unmatched,
                    "Replacement results merged"
                );
            }

            StreamEvent::Error {
                message,
                chunk: Some(chunk),
            } => {
                warn!(chunk, error = %message, "Replacement chunk failed, continuing");
            }

            StreamEvent::Error {
                message,
                chunk: None,
            } => {
                warn!(error = %message, "Replacement job failed");
                self.last_error = Some(message);
                self.state = JobState::Failed;
            }

            StreamEvent::Complete {
                total_analyzed,
                total_skipped,
                results,
            } => {
                apply_replacements(&mut self.records, &results);
                self.progress.total_analyzed = total_analyzed;
                self.progress.total_skipped = total_skipped;
                self.state = JobState::Completed;
            }
        }
    }

    /// Mark the end of the event stream; fatal if no terminal event arrived
    pub fn finish_stream(&mut self) {
        if self.state == JobState::Running {
            warn!("Replacement stream ended without a terminal event");
            self.state = JobState::Failed;
            self.last_error
                .get_or_insert_with(|| "stream ended without a terminal event".to_string());
        }
    }

    pub fn cancel(&mut self) {
        if self.state == JobState::Running {
            self.state = JobState::Cancelled;
        }
    }
}
