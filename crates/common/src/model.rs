//! Part record and enrichment result models
//!
//! These mirror the spreadsheet-facing record shape produced by ingestion,
//! restricted to the fields the enrichment engine reads or writes. Ingestion,
//! persistence, and export live in their own services and are not modeled here.

use serde::{Deserialize, Serialize};

/// Lifecycle classification of a part.
///
/// `NotApplicable` is the explicit marker for records excluded by the
/// stocking-decision skip rule; it is distinct from "not yet classified",
/// which is represented by `Option::None` on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStatus {
    Active,
    Obsolete,
    Review,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "Active",
            LifecycleStatus::Obsolete => "Obsolete",
            LifecycleStatus::Review => "Review",
            LifecycleStatus::NotApplicable => "N/A",
        }
    }
}

/// Classifier self-reported confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A part entry as the engine sees it.
///
/// The primary identity pair is `(part_manufacturer, manufacturer_part_number)`;
/// the fallback pair `(manufacturer, part_number_ai_modified)` holds the
/// AI-corrected spelling from a prior enrichment pass, when one exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartRecord {
    /// 1-based position in the original upload
    #[serde(default)]
    pub row_index: u32,

    #[serde(default)]
    pub part_manufacturer: String,
    #[serde(default)]
    pub manufacturer_part_number: String,

    /// Manufacturer display spelling; only filled in by the engine when blank
    #[serde(default)]
    pub manufacturer: String,
    /// Part number as corrected by a prior AI pass
    #[serde(default)]
    pub part_number_ai_modified: String,

    /// Stocking decision driving classification eligibility
    #[serde(default)]
    pub stocking_decision: String,

    // Classification outputs
    #[serde(default)]
    pub ai_status: Option<LifecycleStatus>,
    #[serde(default)]
    pub notes_by_ai: String,
    #[serde(default)]
    pub ai_confidence: Option<Confidence>,

    // Replacement outputs (populated only for obsolete parts)
    #[serde(default)]
    pub recommended_replacement: String,
    #[serde(default)]
    pub replacement_manufacturer: String,
    #[serde(default)]
    pub replacement_price: Option<f64>,
    #[serde(default)]
    pub replacement_currency: String,
    #[serde(default)]
    pub replacement_source_type: String,
    #[serde(default)]
    pub replacement_source_url: String,
    #[serde(default)]
    pub replacement_notes: String,
    #[serde(default)]
    pub replacement_confidence: Option<Confidence>,
}

impl PartRecord {
    /// True when both identity fields of the primary pair are blank.
    /// Such rows are rejected at the gateway, matching ingestion behavior.
    pub fn is_blank(&self) -> bool {
        self.part_manufacturer.trim().is_empty()
            && self.manufacturer_part_number.trim().is_empty()
    }

    /// Clear classification fields back to the unclassified state
    pub fn clear_classification(&mut self) {
        self.ai_status = None;
        self.notes_by_ai.clear();
        self.ai_confidence = None;
    }

    /// Force the explicit not-applicable marker onto a skipped record.
    /// Stale values from a previous run must not survive.
    pub fn mark_not_applicable(&mut self) {
        self.ai_status = Some(LifecycleStatus::NotApplicable);
        self.notes_by_ai.clear();
        self.ai_confidence = None;
    }
}

/// The identity pair sent to the classifier for one part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartQuery {
    pub manufacturer: String,
    pub part_number: String,
}

impl From<&PartRecord> for PartQuery {
    fn from(record: &PartRecord) -> Self {
        Self {
            manufacturer: record.part_manufacturer.clone(),
            part_number: record.manufacturer_part_number.clone(),
        }
    }
}

/// One classifier verdict, addressed by identity rather than position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub manufacturer: String,
    pub part_number: String,
    pub ai_status: LifecycleStatus,
    #[serde(default)]
    pub notes_by_ai: String,
    pub ai_confidence: Confidence,
}

/// One replacement suggestion for an obsolete part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementResult {
    /// Part number of the obsolete part this suggestion is for
    #[serde(default)]
    pub obsolete_part_number: String,
    /// Fallback identity when the classifier echoes the uncorrected number
    #[serde(default)]
    pub part_number: String,

    pub recommended_replacement: String,
    #[serde(default)]
    pub replacement_manufacturer: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub ai_confidence: Option<Confidence>,
}
