//! Bulk loading for the analytics layer
//!
//! The downstream dashboards take one map of record type to consolidated
//! rows per load. Unlike `consolidate`, which returns an empty result
//! for an empty selection, a bulk load that matches nothing is a hard
//! error: the analytics layer has nothing to show and should say so.

use crate::consolidate::{consolidate_by_type, ConsolidateOptions};
use sicop_common::{Error, Result, Row};
use sicop_cache::RecordStore;
use std::collections::BTreeMap;
use tracing::info;

/// Load every cached record type matching the period filters,
/// consolidated per type with provenance tagging. Empty dimension
/// slices leave that dimension unconstrained.
///
/// No rows are ever silently dropped: deduplication only happens on
/// explicit request through the consolidation options, and this loader
/// never requests it.
pub async fn load_datasets(
    store: &RecordStore,
    years: &[i32],
    months: &[u32],
) -> Result<BTreeMap<String, Vec<Row>>> {
    let matching = store.get_files_matching(years, months, &[]).await?;
    if matching.is_empty() {
        return Err(Error::EmptySelection(format!(
            "years {years:?}, months {months:?}"
        )));
    }

    let mut types: Vec<String> = matching
        .iter()
        .map(|f| f.file_info.record_type.clone())
        .collect();
    types.sort_unstable();
    types.dedup();

    let mut datasets = BTreeMap::new();
    for record_type in types {
        let consolidated = consolidate_by_type(
            store,
            &record_type,
            ConsolidateOptions {
                years: years.to_vec(),
                months: months.to_vec(),
                ..Default::default()
            },
        )
        .await?;

        info!(
            "Loaded {} rows of {} from {} files",
            consolidated.metadata.total_records, record_type, consolidated.metadata.files_included
        );
        datasets.insert(record_type, consolidated.data);
    }

    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sicop_cache::db::init_memory_database;
    use sicop_common::model::COL_YEAR;

    async fn setup_store() -> RecordStore {
        RecordStore::new(init_memory_database().await.unwrap())
    }

    fn rows(count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| {
                [("n".to_string(), json!(i))]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn loads_one_entry_per_type() {
        let store = setup_store().await;
        store
            .save_file("a.csv", &rows(2), 2024, 1, "Contracts")
            .await
            .unwrap();
        store
            .save_file("b.csv", &rows(3), 2024, 1, "Suppliers")
            .await
            .unwrap();

        let datasets = load_datasets(&store, &[2024], &[]).await.unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets.get("Contracts").unwrap().len(), 2);
        assert_eq!(datasets.get("Suppliers").unwrap().len(), 3);

        // Every row is provenance-tagged
        assert!(datasets["Contracts"]
            .iter()
            .all(|row| row.contains_key(COL_YEAR)));
    }

    #[tokio::test]
    async fn empty_selection_fails_loudly() {
        let store = setup_store().await;
        store
            .save_file("a.csv", &rows(1), 2024, 1, "Contracts")
            .await
            .unwrap();

        let result = load_datasets(&store, &[1999], &[]).await;
        assert!(matches!(result, Err(Error::EmptySelection(_))));
    }
}
