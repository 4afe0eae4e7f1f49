//! Record-type registry
//!
//! Single source of truth for the record types the analytics layer
//! consumes. The sync validator compares the cache contents against this
//! registry; the integrity check uses the per-type key fields to detect
//! duplicate rows.
//!
//! The stored set is open (the Record Store accepts any type tag), but
//! everything the downstream dashboards read is enumerated here.

/// Expected record type plus the field combination that uniquely
/// identifies one of its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTypeSpec {
    pub name: &'static str,
    /// Fields whose combined values should be unique per row. Empty
    /// means no uniqueness contract is known for the type.
    pub key_fields: &'static [&'static str],
}

/// Record types the analytics layer expects to find in the cache.
pub const EXPECTED_RECORD_TYPES: &[RecordTypeSpec] = &[
    RecordTypeSpec {
        name: "Contracts",
        key_fields: &["contract_number"],
    },
    RecordTypeSpec {
        name: "Suppliers",
        key_fields: &["supplier_id"],
    },
    RecordTypeSpec {
        name: "Procedures",
        key_fields: &["procedure_number"],
    },
    RecordTypeSpec {
        name: "Awards",
        key_fields: &["procedure_number", "line_number"],
    },
];

/// Names of all expected record types
pub fn expected_type_names() -> Vec<&'static str> {
    EXPECTED_RECORD_TYPES.iter().map(|t| t.name).collect()
}

/// Unique-key fields for a record type, if the type is known
pub fn key_fields_for(record_type: &str) -> Option<&'static [&'static str]> {
    EXPECTED_RECORD_TYPES
        .iter()
        .find(|t| t.name == record_type)
        .map(|t| t.key_fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_distinct() {
        let names = expected_type_names();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
    }

    #[test]
    fn known_type_has_key_fields() {
        assert_eq!(key_fields_for("Contracts"), Some(&["contract_number"][..]));
        assert_eq!(
            key_fields_for("Awards"),
            Some(&["procedure_number", "line_number"][..])
        );
    }

    #[test]
    fn unknown_type_has_none() {
        assert_eq!(key_fields_for("Unknown"), None);
    }
}
