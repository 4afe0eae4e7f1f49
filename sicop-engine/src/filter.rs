//! Advanced filtering on top of the consolidation engine
//!
//! Adds what the flat year/month/type selection cannot express: year and
//! month ranges, quarters and semesters, upload-date windows, ordered
//! predicate chains, period-over-period comparison with a trend
//! classification, and per-period summaries.

use crate::consolidate::{consolidate, AggregateFn, ConsolidateOptions};
use crate::{csv, value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sicop_common::model::{COL_MONTH, COL_UPLOAD_DATE, COL_YEAR};
use sicop_common::{Result, Row};
use sicop_cache::RecordStore;
use std::collections::BTreeMap;
use tracing::warn;

/// Dead zone for trend classification, in percent. Changes within
/// ±this value classify as `Stable` so noise does not flap the trend.
pub const TREND_DEAD_ZONE_PCT: f64 = 1.0;

/// Upload-date window applied post-consolidation against `_UPLOAD_DATE`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Predicate operator for one custom filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    /// Stringified equality ("10" matches 10)
    Equals,
    /// Case-insensitive substring match
    Contains,
    /// Numeric comparison; rows without a numeric value are excluded
    GreaterThan,
    /// Numeric comparison; rows without a numeric value are excluded
    LessThan,
    /// Inclusive numeric range; the value must be a 2-element array,
    /// anything else is a permissive no-op
    Between,
    /// Stringified membership in an array value
    In,
}

/// One predicate in the ordered custom-filter chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl CustomFilter {
    fn describe(&self) -> String {
        let operator = match self.operator {
            FilterOperator::Equals => "equals",
            FilterOperator::Contains => "contains",
            FilterOperator::GreaterThan => "greaterThan",
            FilterOperator::LessThan => "lessThan",
            FilterOperator::Between => "between",
            FilterOperator::In => "in",
        };
        format!("{} {} {}", self.field, operator, self.value)
    }
}

/// Everything `consolidate` accepts plus range expansion, an
/// upload-date window, and the ordered predicate chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    #[serde(flatten)]
    pub base: ConsolidateOptions,
    /// Inclusive year range, expanded to an explicit year list
    pub year_range: Option<(i32, i32)>,
    /// Inclusive month range, expanded to an explicit month list
    pub month_range: Option<(u32, u32)>,
    pub date_range: Option<DateRange>,
    /// Applied sequentially: each filter narrows the previous result
    pub custom_filters: Vec<CustomFilter>,
}

/// What filtering did to the consolidated dataset, plus the dimensions
/// actually present in the output (which may be a strict subset of what
/// was requested).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSummary {
    pub original_records: u64,
    pub filtered_records: u64,
    pub reduction_pct: f64,
    pub applied_filters: Vec<String>,
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub types: Vec<String>,
}

/// Filtered consolidated dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredResult {
    pub data: Vec<Row>,
    pub summary: FilterSummary,
}

/// Consolidate and then filter. Range criteria expand into explicit
/// dimension lists before delegating to the consolidation engine; the
/// date window and custom filters run over the consolidated rows.
pub async fn filter_consolidated(
    store: &RecordStore,
    criteria: &FilterCriteria,
) -> Result<FilteredResult> {
    let mut options = criteria.base.clone();
    let mut applied_filters: Vec<String> = Vec::new();

    if let Some((start, end)) = criteria.year_range {
        options.years.extend(start..=end);
        options.years.sort_unstable();
        options.years.dedup();
        applied_filters.push(format!("years {start}..={end}"));
    }
    if let Some((start, end)) = criteria.month_range {
        options.months.extend(start..=end);
        options.months.sort_unstable();
        options.months.dedup();
        applied_filters.push(format!("months {start}..={end}"));
    }

    let consolidated = consolidate(store, &options).await?;
    let original_records = consolidated.data.len() as u64;
    let mut data = consolidated.data;

    if let Some(range) = &criteria.date_range {
        data.retain(|row| {
            row.get(COL_UPLOAD_DATE)
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| {
                    let t = t.with_timezone(&Utc);
                    t >= range.start && t <= range.end
                })
                .unwrap_or(false)
        });
        applied_filters.push(format!(
            "uploaded {}..{}",
            range.start.to_rfc3339(),
            range.end.to_rfc3339()
        ));
    }

    for filter in &criteria.custom_filters {
        data = apply_custom_filter(data, filter);
        applied_filters.push(filter.describe());
    }

    let filtered_records = data.len() as u64;
    let reduction_pct = if original_records == 0 {
        0.0
    } else {
        (original_records - filtered_records) as f64 / original_records as f64 * 100.0
    };

    let summary = FilterSummary {
        original_records,
        filtered_records,
        reduction_pct,
        applied_filters,
        years: distinct_i64_column(&data, COL_YEAR)
            .into_iter()
            .map(|y| y as i32)
            .collect(),
        months: distinct_i64_column(&data, COL_MONTH)
            .into_iter()
            .map(|m| m as u32)
            .collect(),
        types: types_present(store, &data).await?,
    };

    Ok(FilteredResult { data, summary })
}

/// Apply one predicate. Unknown shapes degrade permissively: a
/// malformed `Between`/`In` value passes rows through unchanged rather
/// than failing the whole chain.
fn apply_custom_filter(rows: Vec<Row>, filter: &CustomFilter) -> Vec<Row> {
    match filter.operator {
        FilterOperator::Equals => {
            let expected = value::display(&filter.value);
            rows.into_iter()
                .filter(|row| {
                    row.get(&filter.field)
                        .map(|v| value::display(v) == expected)
                        .unwrap_or(false)
                })
                .collect()
        }
        FilterOperator::Contains => {
            let needle = value::display(&filter.value).to_lowercase();
            rows.into_iter()
                .filter(|row| {
                    row.get(&filter.field)
                        .map(|v| value::display(v).to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
                .collect()
        }
        FilterOperator::GreaterThan => numeric_filter(rows, filter, |v, bound| v > bound),
        FilterOperator::LessThan => numeric_filter(rows, filter, |v, bound| v < bound),
        FilterOperator::Between => {
            let bounds = filter.value.as_array().and_then(|values| {
                if values.len() == 2 {
                    value::numeric(&values[0]).zip(value::numeric(&values[1]))
                } else {
                    None
                }
            });
            match bounds {
                Some((low, high)) => rows
                    .into_iter()
                    .filter(|row| {
                        row.get(&filter.field)
                            .and_then(value::numeric)
                            .map(|v| v >= low && v <= high)
                            .unwrap_or(false)
                    })
                    .collect(),
                None => {
                    warn!(
                        "between filter on '{}' needs a 2-element array, got {}; skipping",
                        filter.field, filter.value
                    );
                    rows
                }
            }
        }
        FilterOperator::In => match filter.value.as_array() {
            Some(values) => {
                let allowed: Vec<String> = values.iter().map(value::display).collect();
                rows.into_iter()
                    .filter(|row| {
                        row.get(&filter.field)
                            .map(|v| allowed.contains(&value::display(v)))
                            .unwrap_or(false)
                    })
                    .collect()
            }
            None => {
                warn!(
                    "in filter on '{}' needs an array, got {}; skipping",
                    filter.field, filter.value
                );
                rows
            }
        },
    }
}

fn numeric_filter(rows: Vec<Row>, filter: &CustomFilter, keep: fn(f64, f64) -> bool) -> Vec<Row> {
    match value::numeric(&filter.value) {
        Some(bound) => rows
            .into_iter()
            .filter(|row| {
                row.get(&filter.field)
                    .and_then(value::numeric)
                    .map(|v| keep(v, bound))
                    .unwrap_or(false)
            })
            .collect(),
        None => {
            warn!(
                "numeric filter on '{}' has non-numeric bound {}; skipping",
                filter.field, filter.value
            );
            rows
        }
    }
}

fn distinct_i64_column(rows: &[Row], column: &str) -> Vec<i64> {
    let mut values: Vec<i64> = rows
        .iter()
        .filter_map(|row| row.get(column).and_then(|v| v.as_i64()))
        .collect();
    values.sort_unstable();
    values.dedup();
    values
}

/// Record types present among the filtered rows, recovered from the
/// ledger by source file name (rows carry provenance, not their type).
async fn types_present(store: &RecordStore, rows: &[Row]) -> Result<Vec<String>> {
    use sicop_common::model::COL_FILE_SOURCE;

    let mut sources: Vec<&str> = rows
        .iter()
        .filter_map(|row| row.get(COL_FILE_SOURCE).and_then(|v| v.as_str()))
        .collect();
    sources.sort_unstable();
    sources.dedup();

    if sources.is_empty() {
        return Ok(Vec::new());
    }

    let metadata = store.get_metadata().await?;
    let mut types: Vec<String> = metadata
        .files
        .iter()
        .filter(|f| sources.binary_search(&f.file_name.as_str()).is_ok())
        .map(|f| f.record_type.clone())
        .collect();
    types.sort_unstable();
    types.dedup();
    Ok(types)
}

/// Filter to an inclusive year range
pub async fn filter_by_year_range(
    store: &RecordStore,
    start: i32,
    end: i32,
) -> Result<FilteredResult> {
    filter_consolidated(
        store,
        &FilterCriteria {
            year_range: Some((start, end)),
            ..Default::default()
        },
    )
    .await
}

/// Months of a calendar quarter (1-4)
pub fn quarter_months(quarter: u32) -> Option<(u32, u32)> {
    match quarter {
        1 => Some((1, 3)),
        2 => Some((4, 6)),
        3 => Some((7, 9)),
        4 => Some((10, 12)),
        _ => None,
    }
}

/// Filter one quarter of one year
pub async fn filter_by_quarter(
    store: &RecordStore,
    year: i32,
    quarter: u32,
) -> Result<FilteredResult> {
    let months = quarter_months(quarter).ok_or_else(|| {
        sicop_common::Error::InvalidInput(format!("quarter out of range: {quarter}"))
    })?;

    filter_consolidated(
        store,
        &FilterCriteria {
            year_range: Some((year, year)),
            month_range: Some(months),
            ..Default::default()
        },
    )
    .await
}

/// Months of a calendar semester (1-2)
pub fn semester_months(semester: u32) -> Option<(u32, u32)> {
    match semester {
        1 => Some((1, 6)),
        2 => Some((7, 12)),
        _ => None,
    }
}

/// Filter one semester of one year
pub async fn filter_by_semester(
    store: &RecordStore,
    year: i32,
    semester: u32,
) -> Result<FilteredResult> {
    let months = semester_months(semester).ok_or_else(|| {
        sicop_common::Error::InvalidInput(format!("semester out of range: {semester}"))
    })?;

    filter_consolidated(
        store,
        &FilterCriteria {
            year_range: Some((year, year)),
            month_range: Some(months),
            ..Default::default()
        },
    )
    .await
}

/// Comparison period: a whole year or one month of a year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Period {
    Year(i32),
    YearMonth(i32, u32),
}

impl Period {
    fn label(&self) -> String {
        match self {
            Period::Year(year) => year.to_string(),
            Period::YearMonth(year, month) => format!("{year}-{month:02}"),
        }
    }

    fn options(&self, record_type: &str) -> ConsolidateOptions {
        let (years, months) = match self {
            Period::Year(year) => (vec![*year], Vec::new()),
            Period::YearMonth(year, month) => (vec![*year], vec![*month]),
        };
        ConsolidateOptions {
            years,
            months,
            types: vec![record_type.to_string()],
            ..Default::default()
        }
    }
}

/// Direction of change between two periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Classify a percentage change against the ±1% dead zone. Exactly at
/// the boundary is `Stable`.
pub fn classify_trend(pct_change: f64) -> Trend {
    if pct_change > TREND_DEAD_ZONE_PCT {
        Trend::Up
    } else if pct_change < -TREND_DEAD_ZONE_PCT {
        Trend::Down
    } else {
        Trend::Stable
    }
}

/// One side of a period comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodTotal {
    pub period: String,
    pub total: f64,
    pub record_count: u64,
}

/// Two periods of one record type compared on a summed field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub period1: PeriodTotal,
    pub period2: PeriodTotal,
    pub difference: f64,
    pub pct_change: f64,
    pub trend: Trend,
}

/// Compare a summed field between two periods of one record type
pub async fn compare_periods(
    store: &RecordStore,
    period1: Period,
    period2: Period,
    record_type: &str,
    field: &str,
) -> Result<PeriodComparison> {
    let first = period_total(store, period1, record_type, field).await?;
    let second = period_total(store, period2, record_type, field).await?;

    let difference = second.total - first.total;
    let pct_change = if first.total == 0.0 {
        0.0
    } else {
        difference / first.total * 100.0
    };

    Ok(PeriodComparison {
        period1: first,
        period2: second,
        difference,
        pct_change,
        trend: classify_trend(pct_change),
    })
}

async fn period_total(
    store: &RecordStore,
    period: Period,
    record_type: &str,
    field: &str,
) -> Result<PeriodTotal> {
    let consolidated = consolidate(store, &period.options(record_type)).await?;
    let total: f64 = consolidated
        .data
        .iter()
        .filter_map(|row| row.get(field).and_then(value::numeric))
        .sum();

    Ok(PeriodTotal {
        period: period.label(),
        total,
        record_count: consolidated.metadata.total_records,
    })
}

/// Period granularity for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeriodGranularity {
    /// Group key "2024"
    Year,
    /// Group key "01".."12"
    Month,
    /// Group key "2024-01"
    YearMonth,
}

/// One period group of a summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummaryEntry {
    pub period: String,
    pub record_count: u64,
    pub value: f64,
}

/// Group filtered rows by period and aggregate one field per group.
/// Entries come back in period order.
pub async fn summary_by_period(
    store: &RecordStore,
    criteria: &FilterCriteria,
    granularity: PeriodGranularity,
    field: &str,
    function: AggregateFn,
) -> Result<Vec<PeriodSummaryEntry>> {
    let filtered = filter_consolidated(store, criteria).await?;

    let mut groups: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
    for row in &filtered.data {
        let year = row.get(COL_YEAR).and_then(|v| v.as_i64()).unwrap_or(0);
        let month = row.get(COL_MONTH).and_then(|v| v.as_i64()).unwrap_or(0);
        let key = match granularity {
            PeriodGranularity::Year => year.to_string(),
            PeriodGranularity::Month => format!("{month:02}"),
            PeriodGranularity::YearMonth => format!("{year}-{month:02}"),
        };
        groups.entry(key).or_default().push(row);
    }

    Ok(groups
        .into_iter()
        .map(|(period, rows)| {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.get(field).and_then(value::numeric))
                .collect();
            PeriodSummaryEntry {
                period,
                record_count: rows.len() as u64,
                value: function.apply(&values),
            }
        })
        .collect())
}

/// Serialize a filtered consolidation to CSV text (same escaping
/// contract as the consolidation export)
pub async fn export_filtered_csv(store: &RecordStore, criteria: &FilterCriteria) -> Result<String> {
    let filtered = filter_consolidated(store, criteria).await?;
    Ok(csv::rows_to_csv(&filtered.data))
}
