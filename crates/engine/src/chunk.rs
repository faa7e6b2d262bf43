//! Record partitioning
//!
//! Splits a record set into fixed-size, order-preserving chunks of eligible
//! records. Ineligible records never enter a chunk; they are finalized as
//! skipped before any dispatch happens.

use crate::normalize::normalize;
use partforge_common::model::{PartQuery, PartRecord};
use tracing::debug;

/// Negative sentinel in the stocking-decision field
const STOCKING_DECISION_NO: &str = "NO";

/// An ordered slice of eligible records dispatched as one classifier request
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 1-based ordinal, stable across re-chunking of the same input
    pub ordinal: u32,
    /// Total number of chunks in the plan this chunk belongs to
    pub total_chunks: usize,
    /// Identity pairs for the classifier, in original record order
    pub parts: Vec<PartQuery>,
}

/// Result of partitioning a record set
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    /// Indices (into the input slice) of records excluded by the skip rule
    pub skipped: Vec<usize>,
    pub total_records: usize,
}

impl ChunkPlan {
    pub fn total_eligible(&self) -> usize {
        self.chunks.iter().map(|c| c.parts.len()).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.len()
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }
}

/// Eligibility rule: a record participates in classification unless its
/// stocking decision is blank or the negative sentinel ("no", any case).
pub fn is_eligible(stocking_decision: &str) -> bool {
    let decision = normalize(stocking_decision);
    !decision.is_empty() && decision != STOCKING_DECISION_NO
}

/// Partition records into chunks of at most `chunk_size` eligible records.
///
/// Order across chunks and within a chunk follows the input order, so chunk
/// numbering is deterministic for a given input. Zero eligible records yields
/// an empty plan; the caller completes the job immediately.
pub fn partition(records: &[PartRecord], chunk_size: usize) -> ChunkPlan {
    assert!(chunk_size > 0, "chunk_size must be positive");

    let mut eligible = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if is_eligible(&record.stocking_decision) {
            eligible.push(PartQuery::from(record));
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
        .collect::<Vec<_>>();

    debug!(
        total_records = records.len(),
        eligible = eligible.len(),
        skipped = skipped.len(),
        chunks = chunks.len(),
        chunk_size,
        "Records partitioned"
    );

    ChunkPlan {
        chunks,
        skipped,
        total_records: records.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(manufacturer: &str, part_number: &str, stocking: &str) -> PartRecord {
        PartRecord {
            part_manufacturer: manufacturer.to_string(),
            manufacturer_part_number: part_number.to_string(),
            stocking_decision: stocking.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_eligibility_rule() {
        assert!(is_eligible("Yes"));
        assert!(is_eligible("1 per machine"));
        assert!(!is_eligible(""));
        assert!(!is_eligible("   "));
        assert!(!is_eligible("No"));
        assert!(!is_eligible("NO"));
        assert!(!is_eligible(" no "));
    }

    #[test]
    fn test_partition_covers_exactly_the_eligible_records() {
        let records = vec![
            record("Banner", "45136", "Yes"),
            record("Omron", "E3Z", "No"),
            record("SMC", "CDQ2B40", "Yes"),
            record("Festo", "DSNU-20", ""),
        ];

        let plan = partition(&records, 30);
        assert_eq!(plan.total_records, 4);
        assert_eq!(plan.total_eligible(), 2);
        assert_eq!(plan.skipped, vec![1, 3]);
        assert_eq!(plan.total_eligible() + plan.total_skipped(), plan.total_records);

        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].ordinal, 1);
        assert_eq!(plan.chunks[0].parts[0].part_number, "45136");
        assert_eq!(plan.chunks[0].parts[1].part_number, "CDQ2B40");
    }

    #[test]
    fn test_61_records_make_3_chunks() {
        let records: Vec<PartRecord> = (0..61)
            .map(|i| record("Banner", &format!("PN-{i}"), "Yes"))
            .collect();

        let plan = partition(&records, 30);
        assert_eq!(plan.total_chunks(), 3);
        let sizes: Vec<usize> = plan.chunks.iter().map(|c| c.parts.len()).collect();
        assert_eq!(sizes, vec![30, 30, 1]);
        let ordinals: Vec<u32> = plan.chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert!(plan.chunks.iter().all(|c| c.total_chunks == 3));
    }

    #[test]
    fn test_partition_is_deterministic() {
        let records: Vec<PartRecord> = (0..45)
            .map(|i| record("Banner", &format!("PN-{i}"), if i % 3 == 0 { "No" } else { "Yes" }))
            .collect();

        let a = partition(&records, 10);
        let b = partition(&records, 10);
        assert_eq!(a.skipped, b.skipped);
        assert_eq!(a.total_chunks(), b.total_chunks());
        for (ca, cb) in a.chunks.iter().zip(b.chunks.iter()) {
            assert_eq!(ca.ordinal, cb.ordinal);
            let pa: Vec<&str> = ca.parts.iter().map(|p| p.part_number.as_str()).collect();
            let pb: Vec<&str> = cb.parts.iter().map(|p| p.part_number.as_str()).collect();
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_zero_eligible_records() {
        let records = vec![record("Banner", "45136", "No")];
        let plan = partition(&records, 30);
        assert!(plan.chunks.is_empty());
        assert_eq!(plan.total_skipped(), 1);
    }
}
