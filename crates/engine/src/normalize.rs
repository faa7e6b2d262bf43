//! Identity key normalization
//!
//! Free-text manufacturer and part-number fields are matched after trimming
//! and case-folding. The empty key never matches anything, including another
//! empty key: blank-field records must not collide with each other.

use serde::{Deserialize, Serialize};

/// Canonicalize a free-text identifier for matching
pub fn normalize(text: &str) -> String {
    text.trim().to_uppercase()
}

/// Compare two already-normalized keys. Empty keys match nothing.
pub fn keys_match(a: &str, b: &str) -> bool {
    !a.is_empty() && a == b
}

/// Normalized (manufacturer, part_number) pair used to correlate a record
/// with a result. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub manufacturer: String,
    pub part_number: String,
}

impl IdentityKey {
    pub fn new(manufacturer: &str, part_number: &str) -> Self {
        Self {
            manufacturer: normalize(manufacturer),
            part_number: normalize(part_number),
        }
    }

    /// True when both components match under the empty-never-matches rule
    pub fn matches(&self, other: &IdentityKey) -> bool {
        keys_match(&self.manufacturer, &other.manufacturer)
            && keys_match(&self.part_number, &other.part_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_uppercases() {
        assert_eq!(normalize("  Banner Engineering "), "BANNER ENGINEERING");
        assert_eq!(normalize("e3z-d62"), "E3Z-D62");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_empty_keys_never_match() {
        assert!(!keys_match("", ""));
        assert!(!keys_match("", "BANNER"));
        assert!(keys_match("BANNER", "BANNER"));
    }

    #[test]
    fn test_identity_key_matching() {
        let a = IdentityKey::new(" Banner ", "45136");
        let b = IdentityKey::new("BANNER", "45136");
        assert!(a.matches(&b));

        let c = IdentityKey::new("Omron", "45136");
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_blank_records_do_not_collide() {
        let a = IdentityKey::new("", "");
        let b = IdentityKey::new("", "");
        assert!(!a.matches(&b));

        // a blank component alone is enough to rule out a match
        let c = IdentityKey::new("Banner", "");
        let d = IdentityKey::new("Banner", "");
        assert!(!c.matches(&d));
    }
}
