//! Subcommand implementations

use std::path::Path;

use anyhow::{bail, Context, Result};
use sicop_cache::RecordStore;
use sicop_engine::consolidate::{write_consolidated_csv, ConsolidateOptions, SortOrder};
use sicop_engine::filter::{compare_periods, Period};
use sicop_engine::validate::{generate_sync_report, IssueSeverity};
use sicop_engine::csv;

/// Parse a CSV export and save it through the record store
pub async fn ingest(
    store: &RecordStore,
    file: &Path,
    year: i32,
    month: u32,
    record_type: &str,
    name: Option<String>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let rows = csv::rows_from_csv(&text);
    if rows.is_empty() {
        bail!("{} contains no data rows", file.display());
    }

    let file_name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string())
    });

    let id = store
        .save_file(&file_name, &rows, year, month, record_type)
        .await?;

    println!("Cached {} rows of {record_type} as {id}", rows.len());
    Ok(())
}

/// Print the ledger's file list
pub async fn list(store: &RecordStore) -> Result<()> {
    let metadata = store.get_metadata().await?;
    if metadata.files.is_empty() {
        println!("Cache is empty");
        return Ok(());
    }

    for file in &metadata.files {
        println!(
            "{:<40} {:>4}-{:02} {:<12} {:>8} rows  {:>10} bytes  {}",
            file.id,
            file.year,
            file.month,
            file.record_type,
            file.record_count,
            file.size_bytes,
            file.file_name,
        );
    }
    println!(
        "{} file(s), {} record(s) total",
        metadata.files.len(),
        metadata.total_records
    );
    Ok(())
}

/// Print cache statistics
pub async fn stats(store: &RecordStore) -> Result<()> {
    let stats = store.get_cache_stats().await?;
    println!("Files:   {}", stats.total_files);
    println!("Records: {}", stats.total_records);
    println!("Size:    {} bytes", stats.total_size_bytes);
    println!(
        "Years:   {}",
        stats
            .years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Types:   {}", stats.record_types.join(", "));
    Ok(())
}

/// Delete by id, by year, or by (year, month)
pub async fn delete(
    store: &RecordStore,
    id: Option<String>,
    year: Option<i32>,
    month: Option<u32>,
) -> Result<()> {
    match (id, year, month) {
        (Some(id), _, _) => {
            store.delete_file(&id).await?;
            println!("Deleted {id}");
        }
        (None, Some(year), Some(month)) => {
            let deleted = store.delete_files_by_month(year, month).await?;
            println!("Deleted {deleted} file(s) from {year}-{month:02}");
        }
        (None, Some(year), None) => {
            let deleted = store.delete_files_by_year(year).await?;
            println!("Deleted {deleted} file(s) from {year}");
        }
        (None, None, _) => bail!("pass --id, --year, or --year with --month"),
    }
    Ok(())
}

/// Empty the cache
pub async fn clear(store: &RecordStore) -> Result<()> {
    store.clear_cache().await?;
    println!("Cache cleared");
    Ok(())
}

/// Export a consolidated selection as CSV
#[allow(clippy::too_many_arguments)]
pub async fn export(
    store: &RecordStore,
    output: &Path,
    years: Vec<i32>,
    months: Vec<u32>,
    types: Vec<String>,
    deduplicate_by: Option<String>,
    sort_by: Option<String>,
    desc: bool,
) -> Result<()> {
    let options = ConsolidateOptions {
        years,
        months,
        types,
        deduplicate_by,
        sort_by,
        sort_order: if desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        },
    };

    write_consolidated_csv(store, output, &options).await?;
    println!("Wrote {}", output.display());
    Ok(())
}

/// Run the combined sync report and print it
pub async fn validate(store: &RecordStore) -> Result<()> {
    let report = generate_sync_report(store).await?;

    println!(
        "Cache: {} file(s), {} record(s)",
        report.sync.stats.total_files, report.sync.stats.total_records
    );
    println!("Cached types:   {}", report.sync.stats.cached_types.join(", "));
    println!("Expected types: {}", report.sync.stats.expected_types.join(", "));

    for warning in &report.sync.warnings {
        println!("warning: {warning}");
    }
    for issue in &report.integrity.issues {
        let severity = match issue.severity {
            IssueSeverity::Critical => "critical",
            IssueSeverity::Warning => "warning",
        };
        println!("{severity}: [{}] {}", issue.record_type, issue.description);
    }
    for recommendation in &report.recommendations {
        println!("recommendation: {recommendation}");
    }

    if report.sync.warnings.is_empty() && report.integrity.issues.is_empty() {
        println!("No findings");
    }
    Ok(())
}

/// Compare a summed field between two periods
pub async fn compare(
    store: &RecordStore,
    period1: &str,
    period2: &str,
    record_type: &str,
    field: &str,
) -> Result<()> {
    let period1 = parse_period(period1)?;
    let period2 = parse_period(period2)?;

    let comparison = compare_periods(store, period1, period2, record_type, field).await?;

    println!(
        "{}: {} ({} rows)",
        comparison.period1.period, comparison.period1.total, comparison.period1.record_count
    );
    println!(
        "{}: {} ({} rows)",
        comparison.period2.period, comparison.period2.total, comparison.period2.record_count
    );
    println!(
        "difference {:+}, change {:+.2}%, trend {:?}",
        comparison.difference, comparison.pct_change, comparison.trend
    );
    Ok(())
}

/// Parse "YYYY" or "YYYY-MM"
fn parse_period(text: &str) -> Result<Period> {
    match text.split_once('-') {
        None => Ok(Period::Year(text.parse().context("invalid year")?)),
        Some((year, month)) => {
            let year = year.parse().context("invalid year")?;
            let month: u32 = month.parse().context("invalid month")?;
            if !(1..=12).contains(&month) {
                bail!("month out of range: {month}");
            }
            Ok(Period::YearMonth(year, month))
        }
    }
}
