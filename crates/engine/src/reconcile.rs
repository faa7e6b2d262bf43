//! Result reconciliation
//!
//! Merges classifier results back into the authoritative record set by
//! normalized identity key. Results are addressed by identity, not position:
//! the classifier does not echo row order, and chunk completions race.
//!
//! Merging is idempotent: re-applying a payload, or applying an incremental
//! payload followed by the terminal accumulation containing the same entries,
//! converges to the same record set. Chunks partition disjoint records, so
//! last-applied-wins per key never produces a genuine conflict.

use crate::chunk::is_eligible;
use crate::normalize::IdentityKey;
use partforge_common::metrics;
use partforge_common::model::{ClassificationResult, PartRecord};
use tracing::debug;

/// Outcome counts for one merge call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records that received a result
    pub merged: usize,
    /// Results that matched no record and were dropped
    pub unmatched: usize,
}

/// Merge one payload of classification results into `records`.
///
/// For each record both the primary and the fallback identity pair are
/// candidates; the first result matching either wins, and at most one result
/// is applied per record per call. A result that matches no record is dropped
/// with a diagnostic log — the classifier answered for a subject the caller
/// never asked about.
pub fn apply_classifications(
    records: &mut [PartRecord],
    results: &[ClassificationResult],
) -> MergeStats {
    let keys: Vec<IdentityKey> = results
        .iter()
        .map(|r| IdentityKey::new(&r.manufacturer, &r.part_number))
        .collect();
    let mut consumed = vec![false; results.len()];
    let mut stats = MergeStats::default();

    for record in records.iter_mut() {
        if !is_eligible(&record.stocking_decision) {
            // Deliberately excluded, not merely unprocessed: force the
            // explicit marker even if this record never reached a chunk.
            record.mark_not_applicable();
            continue;
        }

        let primary = IdentityKey::new(
            &record.part_manufacturer,
            &record.manufacturer_part_number,
        );
        let fallback = IdentityKey::new(&record.manufacturer, &record.part_number_ai_modified);

        let matched = keys
            .iter()
            .position(|key| key.matches(&primary) || key.matches(&fallback));

        if let Some(index) = matched {
            let result = &results[index];
            record.ai_status = Some(result.ai_status);
            record.notes_by_ai = result.notes_by_ai.clone();
            record.ai_confidence = Some(result.ai_confidence);
            // Preserve the source-of-truth manufacturer spelling when present
            if record.manufacturer.trim().is_empty() {
                record.manufacturer = result.manufacturer.clone();
            }
            consumed[index] = true;
            stats.merged += 1;
        }
        // No match: an eligible record simply hasn't been classified yet; a
        // later event may still carry its result.
    }

    for (index, result) in results.iter().enumerate() {
        if !consumed[index] {
            stats.unmatched += 1;
            debug!(
                manufacturer = %result.manufacturer,
                part_number = %result.part_number,
                "Dropping result with no matching record"
            );
        }
    }

    metrics::record_merge(stats.merged, stats.unmatched);
    stats
}

/// Force the not-applicable marker onto every ineligible record
pub fn finalize_skipped(records: &mut [PartRecord]) {
    for record in records.iter_mut() {
        if !is_eligible(&record.stocking_decision) {
            record.mark_not_applicable();
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

    fn result(manufacturer: &str, part_number: &str, status: LifecycleStatus) -> ClassificationResult {
        ClassificationResult {
            manufacturer: manufacturer.to_string(),
            part_number: part_number.to_string(),
            ai_status: status,
            notes_by_ai: format!("notes for {part_number}"),
            ai_confidence: Confidence::High,
        }
    }

    #[test]
    fn test_merge_by_normalized_key() {
        let mut records = vec![record(" banner ", "45136", "Yes")];
        let results = vec![result("BANNER", "45136", LifecycleStatus::Active)];

        let stats = apply_classifications(&mut records, &results);
        assert_eq!(stats, MergeStats { merged: 1, unmatched: 0 });
        assert_eq!(records[0].ai_status, Some(LifecycleStatus::Active));
        assert_eq!(records[0].notes_by_ai, "notes for 45136");
        assert_eq!(records[0].ai_confidence, Some(Confidence::High));
    }

    #[test]
    fn test_fallback_pair_matches_ai_corrected_identity() {
        let mut records = vec![PartRecord {
            part_manufacturer: "Baner".into(), // typo in the source sheet
            manufacturer_part_number: "45-136".into(),
            manufacturer: "Banner".into(),
            part_number_ai_modified: "45136".into(),
            stocking_decision: "Yes".into(),
            ..Default::default()
        }];
        let results = vec![result("BANNER", "45136", LifecycleStatus::Obsolete)];

        let stats = apply_classifications(&mut records, &results);
        assert_eq!(stats.merged, 1);
        assert_eq!(records[0].ai_status, Some(LifecycleStatus::Obsolete));
    }

    #[test]
    fn test_manufacturer_display_only_filled_when_blank() {
        let mut records = vec![
            PartRecord {
                part_manufacturer: "Banner".into(),
                manufacturer_part_number: "45136".into(),
                manufacturer: "Banner Engineering".into(),
                stocking_decision: "Yes".into(),
                ..Default::default()
            },
            PartRecord {
                part_manufacturer: "Omron".into(),
                manufacturer_part_number: "E3Z".into(),
                stocking_decision: "Yes".into(),
                ..Default::default()
            },
        ];
        let results = vec![
            result("BANNER", "45136", LifecycleStatus::Active),
            result("OMRON", "E3Z", LifecycleStatus::Active),
        ];

        apply_classifications(&mut records, &results);
        assert_eq!(records[0].manufacturer, "Banner Engineering");
        assert_eq!(records[1].manufacturer, "OMRON");
    }

    #[test]
    fn test_unmatched_result_is_dropped_quietly() {
        let mut records = vec![record("Banner", "45136", "Yes")];
        let results = vec![result("UNKNOWN", "XXXX", LifecycleStatus::Active)];

        let stats = apply_classifications(&mut records, &results);
        assert_eq!(stats, MergeStats { merged: 0, unmatched: 1 });
        assert_eq!(records[0].ai_status, None);
    }

    #[test]
    fn test_ineligible_record_forced_to_not_applicable() {
        let mut records = vec![
            record("Banner", "45136", "Yes"),
            record("Omron", "E3Z", "No"),
        ];
        // The skipped record's identity appears in the results anyway; the
        // skip rule still wins.
        let results = vec![
            result("BANNER", "45136", LifecycleStatus::Active),
            result("OMRON", "E3Z", LifecycleStatus::Active),
        ];

        let stats = apply_classifications(&mut records, &results);
        assert_eq!(records[0].ai_status, Some(LifecycleStatus::Active));
        assert_eq!(records[1].ai_status, Some(LifecycleStatus::NotApplicable));
        assert_eq!(stats.unmatched, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut once = vec![record("Banner", "45136", "Yes"), record("SMC", "CDQ2B40", "Yes")];
        let results = vec![
            result("BANNER", "45136", LifecycleStatus::Active),
            result("SMC", "CDQ2B40", LifecycleStatus::Review),
        ];

        apply_classifications(&mut once, &results);
        let mut twice = once.clone();
        apply_classifications(&mut twice, &results);

        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.ai_status, b.ai_status);
            assert_eq!(a.notes_by_ai, b.notes_by_ai);
            assert_eq!(a.ai_confidence, b.ai_confidence);
            assert_eq!(a.manufacturer, b.manufacturer);
        }
    }

    #[test]
    fn test_blank_identity_records_never_merge() {
        let mut records = vec![PartRecord {
            stocking_decision: "Yes".into(),
            ..Default::default()
        }];
        let results = vec![result("", "", LifecycleStatus::Active)];

        let stats = apply_classifications(&mut records, &results);
        assert_eq!(stats, MergeStats { merged: 0, unmatched: 1 });
        assert_eq!(records[0].ai_status, None);
    }

    #[test]
    fn test_finalize_skipped_clears_stale_values() {
        let mut records = vec![PartRecord {
            part_manufacturer: "Omron".into(),
            manufacturer_part_number: "E3Z".into(),
            stocking_decision: "No".into(),
            ai_status: Some(LifecycleStatus::Active),
            notes_by_ai: "stale".into(),
            ai_confidence: Some(Confidence::Low),
            ..Default::default()
        }];

        finalize_skipped(&mut records);
        assert_eq!(records[0].ai_status, Some(LifecycleStatus::NotApplicable));
        assert!(records[0].notes_by_ai.is_empty());
        assert_eq!(records[0].ai_confidence, None);
    }
}
