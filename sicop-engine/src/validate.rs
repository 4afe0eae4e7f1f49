//! Cache/schema sync validation
//!
//! Detects drift between what is physically cached and what the
//! analytics layer expects, without mutating anything. Validation
//! findings are reports, never errors: only a genuine storage failure
//! makes these functions return `Err`.

use crate::value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sicop_common::model::PROVENANCE_COLUMNS;
use sicop_common::registry::{expected_type_names, EXPECTED_RECORD_TYPES};
use sicop_common::{Result, Row};
use sicop_cache::RecordStore;
use std::collections::HashMap;
use tracing::{info, warn};

/// Counts backing a sync report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_files: u64,
    pub total_records: u64,
    pub cached_types: Vec<String>,
    pub expected_types: Vec<String>,
    /// Expected but absent from the cache; downstream features that
    /// depend on them will degrade
    pub missing_types: Vec<String>,
    /// Cached but not expected; ignored by downstream consumers
    pub extra_types: Vec<String>,
}

/// Result of comparing cached types against the registry.
/// `is_valid` turns false only on hard contradictions (reserved for
/// stricter future checks); type mismatches are warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub stats: SyncStats,
}

/// Compare the record types present in the ledger against the expected
/// registry.
pub async fn validate_cache_sync(store: &RecordStore) -> Result<SyncReport> {
    let stats = store.get_cache_stats().await?;
    let expected: Vec<String> = expected_type_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let missing_types: Vec<String> = expected
        .iter()
        .filter(|t| !stats.record_types.contains(t))
        .cloned()
        .collect();
    let extra_types: Vec<String> = stats
        .record_types
        .iter()
        .filter(|t| !expected.contains(t))
        .cloned()
        .collect();

    let mut warnings = Vec::new();
    for record_type in &missing_types {
        warnings.push(format!(
            "expected record type '{record_type}' is not cached; dependent dashboards will be empty"
        ));
    }
    for record_type in &extra_types {
        warnings.push(format!(
            "cached record type '{record_type}' is not consumed by the analytics layer"
        ));
    }

    for warning in &warnings {
        warn!("sync: {warning}");
    }

    Ok(SyncReport {
        is_valid: true,
        warnings,
        errors: Vec::new(),
        stats: SyncStats {
            total_files: stats.total_files,
            total_records: stats.total_records,
            cached_types: stats.record_types,
            expected_types: expected,
            missing_types,
            extra_types,
        },
    })
}

/// Severity of one integrity finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    /// Every row of the type is affected
    Critical,
}

/// One integrity finding for a record type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub record_type: String,
    pub severity: IssueSeverity,
    pub description: String,
}

/// Result of the row-level integrity check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub rows_checked: u64,
    pub issues: Vec<IntegrityIssue>,
    pub recommendations: Vec<String>,
}

/// Row-level integrity check over every expected type with known key
/// fields: duplicate composite keys, rows missing key-field values,
/// and rows missing provenance columns.
///
/// Provenance is checked on the rows as stored. Files written by the
/// normal ingest path carry none (consolidation adds provenance on
/// read), so these findings matter for types the analytics layer
/// expects to consume pre-consolidated: a type whose rows ALL lack a
/// provenance column was never written through the consolidation save
/// path, reported as critical.
pub async fn check_cache_integrity(store: &RecordStore) -> Result<IntegrityReport> {
    let mut rows_checked = 0u64;
    let mut issues: Vec<IntegrityIssue> = Vec::new();
    let mut recommendations: Vec<String> = Vec::new();

    for spec in EXPECTED_RECORD_TYPES {
        if spec.key_fields.is_empty() {
            continue;
        }

        let files = store.get_files_by_type(spec.name).await?;
        let rows: Vec<&Row> = files.iter().flat_map(|f| f.data.iter()).collect();
        if rows.is_empty() {
            continue;
        }
        rows_checked += rows.len() as u64;

        check_duplicate_keys(spec.name, spec.key_fields, &rows, &mut issues, &mut recommendations);
        check_missing_key_fields(spec.name, spec.key_fields, &rows, &mut issues);
        check_provenance(spec.name, &rows, &mut issues, &mut recommendations);
    }

    info!(
        "Integrity check: {} rows, {} issues",
        rows_checked,
        issues.len()
    );

    Ok(IntegrityReport {
        rows_checked,
        issues,
        recommendations,
    })
}

fn composite_key(row: &Row, key_fields: &[&str]) -> Option<String> {
    let mut parts = Vec::with_capacity(key_fields.len());
    for field in key_fields {
        match row.get(*field) {
            Some(v) if !v.is_null() => parts.push(value::display(v)),
            _ => return None,
        }
    }
    Some(parts.join("|"))
}

fn check_duplicate_keys(
    record_type: &str,
    key_fields: &[&str],
    rows: &[&Row],
    issues: &mut Vec<IntegrityIssue>,
    recommendations: &mut Vec<String>,
) {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for row in rows {
        if let Some(key) = composite_key(row, key_fields) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    let duplicate_keys = counts.values().filter(|&&count| count > 1).count();
    if duplicate_keys > 0 {
        let extra_rows: u64 = counts.values().filter(|&&c| c > 1).map(|&c| c - 1).sum();
        issues.push(IntegrityIssue {
            record_type: record_type.to_string(),
            severity: IssueSeverity::Warning,
            description: format!(
                "{duplicate_keys} duplicate {} value(s) ({extra_rows} redundant row(s))",
                key_fields.join("+"),
            ),
        });
        recommendations.push(format!(
            "consolidate '{record_type}' with deduplicate_by='{}' before analysis",
            key_fields[0]
        ));
    }
}

fn check_missing_key_fields(
    record_type: &str,
    key_fields: &[&str],
    rows: &[&Row],
    issues: &mut Vec<IntegrityIssue>,
) {
    let missing = rows
        .iter()
        .filter(|row| composite_key(row, key_fields).is_none())
        .count();
    if missing > 0 {
        issues.push(IntegrityIssue {
            record_type: record_type.to_string(),
            severity: IssueSeverity::Warning,
            description: format!(
                "{missing} row(s) missing a value for key field(s) {}",
                key_fields.join("+")
            ),
        });
    }
}

fn check_provenance(
    record_type: &str,
    rows: &[&Row],
    issues: &mut Vec<IntegrityIssue>,
    recommendations: &mut Vec<String>,
) {
    let mut all_missing = false;
    for column in PROVENANCE_COLUMNS {
        let present = rows.iter().filter(|row| row.contains_key(column)).count();
        if present == 0 {
            all_missing = true;
            issues.push(IntegrityIssue {
                record_type: record_type.to_string(),
                severity: IssueSeverity::Critical,
                description: format!(
                    "no row carries the provenance column {column}; the type was never written through the consolidation save path"
                ),
            });
        } else if present < rows.len() {
            issues.push(IntegrityIssue {
                record_type: record_type.to_string(),
                severity: IssueSeverity::Warning,
                description: format!(
                    "{} of {} row(s) lack the provenance column {column}",
                    rows.len() - present,
                    rows.len()
                ),
            });
        }
    }

    if all_missing {
        recommendations.push(format!(
            "re-cache '{record_type}' through the consolidation save path if the analytics layer reads it pre-consolidated"
        ));
    }
}

/// Combined sync + integrity report with aggregated recommendations.
/// Read-only diagnostic, intended to run before a bulk load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedSyncReport {
    pub generated_at: DateTime<Utc>,
    pub sync: SyncReport,
    pub integrity: IntegrityReport,
    pub recommendations: Vec<String>,
}

/// Compose [`validate_cache_sync`] and [`check_cache_integrity`]
pub async fn generate_sync_report(store: &RecordStore) -> Result<CombinedSyncReport> {
    let sync = validate_cache_sync(store).await?;
    let integrity = check_cache_integrity(store).await?;

    let mut recommendations: Vec<String> = Vec::new();
    if !sync.stats.missing_types.is_empty() {
        recommendations.push(format!(
            "ingest the missing record type(s): {}",
            sync.stats.missing_types.join(", ")
        ));
    }
    recommendations.extend(integrity.recommendations.iter().cloned());

    Ok(CombinedSyncReport {
        generated_at: Utc::now(),
        sync,
        integrity,
        recommendations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use sicop_cache::db::init_memory_database;

    async fn setup_store() -> RecordStore {
        RecordStore::new(init_memory_database().await.unwrap())
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn missing_and_extra_types_are_warnings_not_errors() {
        let store = setup_store().await;
        store
            .save_file(
                "c.csv",
                &[row(&[("contract_number", json!("C-1"))])],
                2024,
                1,
                "Contracts",
            )
            .await
            .unwrap();
        store
            .save_file(
                "x.csv",
                &[row(&[("whatever", json!(1))])],
                2024,
                1,
                "Experimental",
            )
            .await
            .unwrap();

        let report = validate_cache_sync(&store).await.unwrap();
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(report.stats.missing_types.contains(&"Suppliers".to_string()));
        assert!(report.stats.extra_types.contains(&"Experimental".to_string()));
        assert!(!report.warnings.is_empty());
    }

    #[tokio::test]
    async fn empty_cache_reports_every_expected_type_missing() {
        let store = setup_store().await;
        let report = validate_cache_sync(&store).await.unwrap();
        assert!(report.is_valid);
        assert_eq!(
            report.stats.missing_types.len(),
            report.stats.expected_types.len()
        );
    }

    #[tokio::test]
    async fn duplicate_composite_keys_are_detected() {
        let store = setup_store().await;
        let rows = vec![
            row(&[("contract_number", json!("C-1"))]),
            row(&[("contract_number", json!("C-1"))]),
            row(&[("contract_number", json!("C-2"))]),
        ];
        store
            .save_file("c.csv", &rows, 2024, 1, "Contracts")
            .await
            .unwrap();

        let report = check_cache_integrity(&store).await.unwrap();
        assert!(report.issues.iter().any(|issue| {
            issue.record_type == "Contracts" && issue.description.contains("duplicate")
        }));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("deduplicate_by")));
    }

    #[tokio::test]
    async fn duplicates_across_files_are_detected() {
        let store = setup_store().await;
        store
            .save_file(
                "jan.csv",
                &[row(&[("contract_number", json!("C-1"))])],
                2024,
                1,
                "Contracts",
            )
            .await
            .unwrap();
        store
            .save_file(
                "feb.csv",
                &[row(&[("contract_number", json!("C-1"))])],
                2024,
                2,
                "Contracts",
            )
            .await
            .unwrap();

        let report = check_cache_integrity(&store).await.unwrap();
        assert!(report
            .issues
            .iter()
            .any(|issue| issue.description.contains("duplicate")));
    }

    #[tokio::test]
    async fn missing_key_fields_are_reported() {
        let store = setup_store().await;
        let rows = vec![
            row(&[("contract_number", json!("C-1"))]),
            row(&[("contract_number", Value::Null)]),
            row(&[("other", json!("x"))]),
        ];
        store
            .save_file("c.csv", &rows, 2024, 1, "Contracts")
            .await
            .unwrap();

        let report = check_cache_integrity(&store).await.unwrap();
        assert!(report.issues.iter().any(|issue| {
            issue.description.contains("missing a value") && issue.description.contains("2 row(s)")
        }));
    }

    #[tokio::test]
    async fn raw_uploads_flag_absent_provenance_as_critical() {
        let store = setup_store().await;
        store
            .save_file(
                "c.csv",
                &[row(&[("contract_number", json!("C-1"))])],
                2024,
                1,
                "Contracts",
            )
            .await
            .unwrap();

        let report = check_cache_integrity(&store).await.unwrap();
        let critical: Vec<_> = report
            .issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Critical)
            .collect();
        assert_eq!(critical.len(), PROVENANCE_COLUMNS.len());
    }

    #[tokio::test]
    async fn consolidated_saves_pass_the_provenance_check() {
        let store = setup_store().await;
        store
            .save_file(
                "c.csv",
                &[row(&[("contract_number", json!("C-1"))])],
                2024,
                1,
                "Awards",
            )
            .await
            .unwrap();

        // Re-cache Contracts through the consolidation save path
        crate::consolidate::save_consolidated_as_cache(
            &store,
            "contracts-consolidated.csv",
            2024,
            1,
            "Contracts",
            &crate::consolidate::ConsolidateOptions {
                types: vec!["Awards".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let report = check_cache_integrity(&store).await.unwrap();
        assert!(!report.issues.iter().any(|issue| {
            issue.record_type == "Contracts" && issue.severity == IssueSeverity::Critical
        }));
    }

    #[tokio::test]
    async fn combined_report_aggregates_recommendations() {
        let store = setup_store().await;
        let report = generate_sync_report(&store).await.unwrap();
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("missing record type")));
        assert!(report.sync.is_valid);
        assert_eq!(report.integrity.rows_checked, 0);
    }
}
