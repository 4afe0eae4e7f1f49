//! Consolidation engine
//!
//! Turns a filtered set of cached files into one flat, query-ready
//! dataset: rows from every matching file, tagged with provenance
//! columns, optionally deduplicated and sorted, plus aggregate
//! statistics over any field.
//!
//! Selection semantics: OR within a dimension, AND across dimensions.
//! A file matches when its year is in `years` (or `years` is empty),
//! AND its month is in `months` (or empty), AND its type is in `types`
//! (or empty).

use crate::{csv, value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sicop_common::model::{COL_FILE_SOURCE, COL_MONTH, COL_UPLOAD_DATE, COL_YEAR};
use sicop_common::{Result, Row, StoredData};
use sicop_cache::RecordStore;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Sort direction for consolidated output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Selection and shaping options for one consolidation call.
/// Empty dimension lists leave that dimension unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateOptions {
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub types: Vec<String>,
    /// Keep only the first row (in concatenation order) per distinct
    /// value of this field
    pub deduplicate_by: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

/// Metadata describing one consolidated dataset. Range fields are
/// `None` when no files matched; they are never sentinel values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedMetadata {
    pub total_records: u64,
    pub files_included: u64,
    pub year_range: Option<(i32, i32)>,
    pub month_range: Option<(u32, u32)>,
    /// Distinct record types among included files, ascending
    pub types: Vec<String>,
    /// Rows dropped by deduplication (0 when not requested)
    pub duplicates_dropped: u64,
    pub consolidated_at: DateTime<Utc>,
}

/// A transient consolidated dataset. Never persisted unless the caller
/// explicitly saves it back as a new cached file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub data: Vec<Row>,
    pub metadata: ConsolidatedMetadata,
}

/// Aggregate function over a numeric field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Sum,
    Avg,
    Min,
    Max,
    /// Number of rows whose field value parses as a number
    Count,
}

impl AggregateFn {
    /// Apply to the parsed values of one group. Empty input yields 0.
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            AggregateFn::Sum => values.iter().sum(),
            AggregateFn::Avg => values.iter().sum::<f64>() / values.len() as f64,
            AggregateFn::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregateFn::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregateFn::Count => values.len() as f64,
        }
    }
}

/// Consolidate every matching cached file into one flat dataset.
///
/// Rows keep file iteration order then row order within each file;
/// provenance columns identify where each row came from. Zero matches
/// is not an error: the result is empty and well-formed.
pub async fn consolidate(
    store: &RecordStore,
    options: &ConsolidateOptions,
) -> Result<ConsolidatedResult> {
    let files = store
        .get_files_matching(&options.years, &options.months, &options.types)
        .await?;

    let mut data: Vec<Row> = Vec::new();
    for stored in &files {
        for row in &stored.data {
            data.push(tag_row(row, stored));
        }
    }

    let mut duplicates_dropped = 0u64;
    if let Some(field) = &options.deduplicate_by {
        let before = data.len();
        let mut seen: HashSet<String> = HashSet::new();
        data.retain(|row| {
            let key = row
                .get(field)
                .map(value::display)
                .unwrap_or_else(|| "null".to_string());
            seen.insert(key)
        });
        duplicates_dropped = (before - data.len()) as u64;
        if duplicates_dropped > 0 {
            info!(
                "Deduplication by '{}' dropped {} of {} rows",
                field, duplicates_dropped, before
            );
        }
    }

    if let Some(field) = &options.sort_by {
        data.sort_by(|a, b| {
            let ordering = value::compare(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
            );
            match options.sort_order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }

    let metadata = build_metadata(&files, data.len() as u64, duplicates_dropped);
    debug!(
        "Consolidated {} rows from {} files",
        metadata.total_records, metadata.files_included
    );

    Ok(ConsolidatedResult { data, metadata })
}

fn tag_row(row: &Row, stored: &StoredData) -> Row {
    let mut tagged = row.clone();
    tagged.insert(COL_YEAR.to_string(), json!(stored.file_info.year));
    tagged.insert(COL_MONTH.to_string(), json!(stored.file_info.month));
    tagged.insert(
        COL_FILE_SOURCE.to_string(),
        json!(stored.file_info.file_name),
    );
    tagged.insert(
        COL_UPLOAD_DATE.to_string(),
        json!(stored.file_info.upload_date.to_rfc3339()),
    );
    tagged
}

fn build_metadata(
    files: &[StoredData],
    total_records: u64,
    duplicates_dropped: u64,
) -> ConsolidatedMetadata {
    let years = files.iter().map(|f| f.file_info.year);
    let months = files.iter().map(|f| f.file_info.month);

    let mut types: Vec<String> = files
        .iter()
        .map(|f| f.file_info.record_type.clone())
        .collect();
    types.sort_unstable();
    types.dedup();

    ConsolidatedMetadata {
        total_records,
        files_included: files.len() as u64,
        year_range: years.clone().min().zip(years.max()),
        month_range: months.clone().min().zip(months.max()),
        types,
        duplicates_dropped,
        consolidated_at: Utc::now(),
    }
}

/// All cached files of one record type
pub async fn consolidate_by_type(
    store: &RecordStore,
    record_type: &str,
    mut options: ConsolidateOptions,
) -> Result<ConsolidatedResult> {
    options.types = vec![record_type.to_string()];
    consolidate(store, &options).await
}

/// All cached files of one year
pub async fn consolidate_by_year(
    store: &RecordStore,
    year: i32,
    mut options: ConsolidateOptions,
) -> Result<ConsolidatedResult> {
    options.years = vec![year];
    consolidate(store, &options).await
}

/// All cached files of one (year, month) period
pub async fn consolidate_by_month(
    store: &RecordStore,
    year: i32,
    month: u32,
    mut options: ConsolidateOptions,
) -> Result<ConsolidatedResult> {
    options.years = vec![year];
    options.months = vec![month];
    consolidate(store, &options).await
}

/// All cached files with year in `start..=end`
pub async fn consolidate_by_year_range(
    store: &RecordStore,
    start: i32,
    end: i32,
    mut options: ConsolidateOptions,
) -> Result<ConsolidatedResult> {
    options.years = (start..=end).collect();
    consolidate(store, &options).await
}

/// Everything in the cache
pub async fn consolidate_all(store: &RecordStore) -> Result<ConsolidatedResult> {
    consolidate(store, &ConsolidateOptions::default()).await
}

/// Group consolidated rows by the exact (stringified) value of one
/// field. Rows missing the field group under the `"null"` key; nothing
/// is silently dropped.
pub async fn consolidate_and_group_by(
    store: &RecordStore,
    field: &str,
    options: &ConsolidateOptions,
) -> Result<BTreeMap<String, Vec<Row>>> {
    let consolidated = consolidate(store, options).await?;

    let mut groups: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    for row in consolidated.data {
        let key = row
            .get(field)
            .map(value::display)
            .unwrap_or_else(|| "null".to_string());
        groups.entry(key).or_default().push(row);
    }

    Ok(groups)
}

/// Aggregate one field over the whole consolidated dataset.
/// Values that do not parse as numbers are excluded, not zeroed.
pub async fn consolidate_and_aggregate(
    store: &RecordStore,
    field: &str,
    function: AggregateFn,
    options: &ConsolidateOptions,
) -> Result<f64> {
    let consolidated = consolidate(store, options).await?;
    let values: Vec<f64> = consolidated
        .data
        .iter()
        .filter_map(|row| row.get(field).and_then(value::numeric))
        .collect();
    Ok(function.apply(&values))
}

/// Aggregate one field per group of another field's values
pub async fn consolidate_and_aggregate_by(
    store: &RecordStore,
    field: &str,
    function: AggregateFn,
    group_by: &str,
    options: &ConsolidateOptions,
) -> Result<BTreeMap<String, f64>> {
    let groups = consolidate_and_group_by(store, group_by, options).await?;

    Ok(groups
        .into_iter()
        .map(|(key, rows)| {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.get(field).and_then(value::numeric))
                .collect();
            (key, function.apply(&values))
        })
        .collect())
}

/// Summary statistics for a consolidation, including the estimated
/// serialized size of the dataset in megabytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedStats {
    pub total_records: u64,
    pub files_included: u64,
    pub year_range: Option<(i32, i32)>,
    pub month_range: Option<(u32, u32)>,
    pub types: Vec<String>,
    pub size_mb: f64,
}

/// Consolidate and report statistics without keeping the rows
pub async fn consolidated_stats(
    store: &RecordStore,
    options: &ConsolidateOptions,
) -> Result<ConsolidatedStats> {
    let consolidated = consolidate(store, options).await?;
    let serialized = serde_json::to_string(&consolidated.data)?;

    Ok(ConsolidatedStats {
        total_records: consolidated.metadata.total_records,
        files_included: consolidated.metadata.files_included,
        year_range: consolidated.metadata.year_range,
        month_range: consolidated.metadata.month_range,
        types: consolidated.metadata.types,
        size_mb: serialized.len() as f64 / (1024.0 * 1024.0),
    })
}

/// Serialize a consolidation to CSV text
pub async fn export_consolidated_csv(
    store: &RecordStore,
    options: &ConsolidateOptions,
) -> Result<String> {
    let consolidated = consolidate(store, options).await?;
    Ok(csv::rows_to_csv(&consolidated.data))
}

/// Write a consolidation to a CSV file on disk
pub async fn write_consolidated_csv(
    store: &RecordStore,
    path: &Path,
    options: &ConsolidateOptions,
) -> Result<()> {
    let text = export_consolidated_csv(store, options).await?;
    tokio::fs::write(path, text).await?;
    info!("Exported consolidated CSV to {}", path.display());
    Ok(())
}

/// Persist a consolidation back through the store as a brand-new cached
/// file. Source files are never mutated. Returns the new file id.
pub async fn save_consolidated_as_cache(
    store: &RecordStore,
    file_name: &str,
    year: i32,
    month: u32,
    record_type: &str,
    options: &ConsolidateOptions,
) -> Result<String> {
    let consolidated = consolidate(store, options).await?;
    store
        .save_file(file_name, &consolidated.data, year, month, record_type)
        .await
}

/// Summed field totals for two (year, month, type) selections.
/// `pct_change` is 0 when the base period's total is 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthComparison {
    pub period1_total: f64,
    pub period2_total: f64,
    pub difference: f64,
    pub pct_change: f64,
}

/// Compare one field's sum between two months of a record type
pub async fn compare_month_totals(
    store: &RecordStore,
    year1: i32,
    month1: u32,
    year2: i32,
    month2: u32,
    record_type: &str,
    field: &str,
) -> Result<MonthComparison> {
    let options1 = ConsolidateOptions {
        years: vec![year1],
        months: vec![month1],
        types: vec![record_type.to_string()],
        ..Default::default()
    };
    let options2 = ConsolidateOptions {
        years: vec![year2],
        months: vec![month2],
        types: vec![record_type.to_string()],
        ..Default::default()
    };

    let period1_total = consolidate_and_aggregate(store, field, AggregateFn::Sum, &options1).await?;
    let period2_total = consolidate_and_aggregate(store, field, AggregateFn::Sum, &options2).await?;

    let difference = period2_total - period1_total;
    let pct_change = if period1_total == 0.0 {
        0.0
    } else {
        difference / period1_total * 100.0
    };

    Ok(MonthComparison {
        period1_total,
        period2_total,
        difference,
        pct_change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
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

    async fn seed_standard(store: &RecordStore) {
        // Contracts 2024-01 (5 rows), Contracts 2024-02 (3 rows),
        // Suppliers 2024-01 (2 rows)
        let contracts_jan: Vec<Row> = (0..5)
            .map(|i| row(&[("contract_number", json!(format!("C-{i}"))), ("amount", json!(10 * (i + 1)))]))
            .collect();
        let contracts_feb: Vec<Row> = (0..3)
            .map(|i| row(&[("contract_number", json!(format!("F-{i}"))), ("amount", json!(100))]))
            .collect();
        let suppliers_jan: Vec<Row> = (0..2)
            .map(|i| row(&[("supplier_id", json!(format!("S-{i}")))]))
            .collect();

        store
            .save_file("contracts-jan.csv", &contracts_jan, 2024, 1, "Contracts")
            .await
            .unwrap();
        store
            .save_file("contracts-feb.csv", &contracts_feb, 2024, 2, "Contracts")
            .await
            .unwrap();
        store
            .save_file("suppliers-jan.csv", &suppliers_jan, 2024, 1, "Suppliers")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn consolidate_by_type_merges_matching_files() {
        let store = setup_store().await;
        seed_standard(&store).await;

        let result = consolidate_by_type(
            &store,
            "Contracts",
            ConsolidateOptions {
                years: vec![2024],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(result.data.len(), 8);
        assert_eq!(result.metadata.files_included, 2);
        assert_eq!(result.metadata.types, vec!["Contracts"]);
        assert_eq!(result.metadata.year_range, Some((2024, 2024)));
        assert_eq!(result.metadata.month_range, Some((1, 2)));
    }

    #[tokio::test]
    async fn every_row_carries_provenance() {
        let store = setup_store().await;
        seed_standard(&store).await;

        let result = consolidate_all(&store).await.unwrap();
        assert_eq!(result.data.len(), 10);
        for tagged in &result.data {
            assert!(tagged.contains_key(COL_YEAR));
            assert!(tagged.contains_key(COL_MONTH));
            assert!(tagged.contains_key(COL_FILE_SOURCE));
            assert!(tagged.contains_key(COL_UPLOAD_DATE));
        }
    }

    #[tokio::test]
    async fn empty_selection_is_well_formed() {
        let store = setup_store().await;

        let result = consolidate_all(&store).await.unwrap();
        assert!(result.data.is_empty());
        assert_eq!(result.metadata.files_included, 0);
        assert_eq!(result.metadata.year_range, None);
        assert_eq!(result.metadata.month_range, None);
        assert!(result.metadata.types.is_empty());
    }

    #[tokio::test]
    async fn disjoint_selections_add_up() {
        let store = setup_store().await;
        seed_standard(&store).await;

        let jan = consolidate_by_month(&store, 2024, 1, ConsolidateOptions::default())
            .await
            .unwrap();
        let feb = consolidate_by_month(&store, 2024, 2, ConsolidateOptions::default())
            .await
            .unwrap();
        let both = consolidate(
            &store,
            &ConsolidateOptions {
                years: vec![2024],
                months: vec![1, 2],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(both.data.len(), jan.data.len() + feb.data.len());
    }

    #[tokio::test]
    async fn deduplication_keeps_first_occurrence() {
        let store = setup_store().await;
        let rows = vec![
            row(&[("k", json!(1)), ("v", json!("a"))]),
            row(&[("k", json!(1)), ("v", json!("b"))]),
            row(&[("k", json!(2)), ("v", json!("c"))]),
        ];
        store
            .save_file("dups.csv", &rows, 2024, 1, "Contracts")
            .await
            .unwrap();

        let result = consolidate(
            &store,
            &ConsolidateOptions {
                deduplicate_by: Some("k".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(result.data.len(), 2);
        assert_eq!(result.metadata.duplicates_dropped, 1);
        let first = result
            .data
            .iter()
            .find(|r| r.get("k") == Some(&json!(1)))
            .unwrap();
        assert_eq!(first.get("v"), Some(&json!("a")));
    }

    #[tokio::test]
    async fn sort_orders_numerically_when_possible() {
        let store = setup_store().await;
        let rows = vec![
            row(&[("amount", json!("9"))]),
            row(&[("amount", json!("100"))]),
            row(&[("amount", json!(25))]),
        ];
        store
            .save_file("amounts.csv", &rows, 2024, 1, "Contracts")
            .await
            .unwrap();

        let result = consolidate(
            &store,
            &ConsolidateOptions {
                sort_by: Some("amount".to_string()),
                sort_order: SortOrder::Descending,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let amounts: Vec<String> = result
            .data
            .iter()
            .map(|r| value::display(r.get("amount").unwrap()))
            .collect();
        assert_eq!(amounts, vec!["100", "25", "9"]);
    }

    #[tokio::test]
    async fn aggregate_excludes_non_numeric() {
        let store = setup_store().await;
        let rows = vec![
            row(&[("amt", json!("10"))]),
            row(&[("amt", json!("20"))]),
            row(&[("amt", json!("abc"))]),
        ];
        store
            .save_file("amts.csv", &rows, 2024, 1, "Contracts")
            .await
            .unwrap();

        let sum = consolidate_and_aggregate(
            &store,
            "amt",
            AggregateFn::Sum,
            &ConsolidateOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(sum, 30.0);

        let count = consolidate_and_aggregate(
            &store,
            "amt",
            AggregateFn::Count,
            &ConsolidateOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(count, 2.0);

        let avg = consolidate_and_aggregate(
            &store,
            "amt",
            AggregateFn::Avg,
            &ConsolidateOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(avg, 15.0);
    }

    #[tokio::test]
    async fn group_by_keeps_rows_missing_the_field() {
        let store = setup_store().await;
        seed_standard(&store).await;

        let groups =
            consolidate_and_group_by(&store, "contract_number", &ConsolidateOptions::default())
                .await
                .unwrap();

        // Supplier rows have no contract_number; they group under "null"
        assert_eq!(groups.get("null").map(|rows| rows.len()), Some(2));
        let grouped_total: usize = groups.values().map(|rows| rows.len()).sum();
        assert_eq!(grouped_total, 10);
    }

    #[tokio::test]
    async fn aggregate_by_group() {
        let store = setup_store().await;
        let rows = vec![
            row(&[("sector", json!("health")), ("amount", json!(10))]),
            row(&[("sector", json!("health")), ("amount", json!(20))]),
            row(&[("sector", json!("roads")), ("amount", json!(5))]),
        ];
        store
            .save_file("sectors.csv", &rows, 2024, 1, "Contracts")
            .await
            .unwrap();

        let totals = consolidate_and_aggregate_by(
            &store,
            "amount",
            AggregateFn::Sum,
            "sector",
            &ConsolidateOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(totals.get("health"), Some(&30.0));
        assert_eq!(totals.get("roads"), Some(&5.0));
    }

    #[tokio::test]
    async fn save_consolidated_creates_a_new_file() {
        let store = setup_store().await;
        seed_standard(&store).await;

        let id = save_consolidated_as_cache(
            &store,
            "contracts-2024.csv",
            2024,
            12,
            "Contracts",
            &ConsolidateOptions {
                types: vec!["Contracts".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let saved = store.get_file(&id).await.unwrap().unwrap();
        assert_eq!(saved.file_info.record_count, 8);
        // Sources are untouched
        let metadata = store.get_metadata().await.unwrap();
        assert_eq!(metadata.files.len(), 4);
    }

    #[tokio::test]
    async fn month_comparison_handles_zero_base() {
        let store = setup_store().await;
        seed_standard(&store).await;

        // 2023-01 has no data: base total 0 -> pct_change 0
        let comparison = compare_month_totals(&store, 2023, 1, 2024, 1, "Contracts", "amount")
            .await
            .unwrap();
        assert_eq!(comparison.period1_total, 0.0);
        assert_eq!(comparison.period2_total, 150.0);
        assert_eq!(comparison.pct_change, 0.0);

        let comparison = compare_month_totals(&store, 2024, 1, 2024, 2, "Contracts", "amount")
            .await
            .unwrap();
        assert_eq!(comparison.period1_total, 150.0);
        assert_eq!(comparison.period2_total, 300.0);
        assert_eq!(comparison.difference, 150.0);
        assert_eq!(comparison.pct_change, 100.0);
    }

    #[tokio::test]
    async fn csv_export_includes_provenance_columns() {
        let store = setup_store().await;
        seed_standard(&store).await;

        let text = export_consolidated_csv(
            &store,
            &ConsolidateOptions {
                types: vec!["Suppliers".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let header = text.lines().next().unwrap();
        assert!(header.contains("_YEAR"));
        assert!(header.contains("supplier_id"));
        assert_eq!(text.lines().count(), 3); // header + 2 rows
    }
}
