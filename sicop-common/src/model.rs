//! Shared data model for the cache and consolidation layers
//!
//! Uploaded datasets are dynamic: column sets vary by record type and are
//! not known at compile time, so rows are modeled as string-keyed maps of
//! scalar JSON values rather than fixed structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed CSV row: column name -> scalar value (string, number,
/// bool or null). Keys are not normalized at this layer.
pub type Row = serde_json::Map<String, Value>;

/// Provenance column added to every consolidated row: source data year
pub const COL_YEAR: &str = "_YEAR";
/// Provenance column: source data month
pub const COL_MONTH: &str = "_MONTH";
/// Provenance column: originating file name
pub const COL_FILE_SOURCE: &str = "_FILE_SOURCE";
/// Provenance column: originating file's upload timestamp
pub const COL_UPLOAD_DATE: &str = "_UPLOAD_DATE";

/// All provenance columns, in the order they are added
pub const PROVENANCE_COLUMNS: [&str; 4] = [COL_YEAR, COL_MONTH, COL_FILE_SOURCE, COL_UPLOAD_DATE];

/// Descriptor of one uploaded dataset.
///
/// `size_bytes` and `record_count` are computed once at save time and
/// trusted afterwards; they are never re-derived from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Unique id: `{type}_{year}_{month}_{timestamp_ms}`
    pub id: String,
    /// Original file name, display-only
    pub file_name: String,
    /// Calendar year the data belongs to (not the upload date)
    pub year: i32,
    /// Month 1-12
    pub month: u32,
    /// Record-type tag, e.g. "Contracts" or "Suppliers"
    pub record_type: String,
    /// Ingestion timestamp, immutable after creation
    pub upload_date: DateTime<Utc>,
    /// Byte length of the serialized payload
    pub size_bytes: u64,
    /// Number of rows in the payload
    pub record_count: u64,
}

impl StoredFile {
    /// Build the id for a new upload. The millisecond timestamp keeps
    /// repeated uploads of the same type/period distinct.
    pub fn make_id(record_type: &str, year: i32, month: u32, uploaded: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}_{}",
            record_type,
            year,
            month,
            uploaded.timestamp_millis()
        )
    }
}

/// A stored dataset: descriptor plus payload rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredData {
    /// Always equals `file_info.id`
    pub id: String,
    pub file_info: StoredFile,
    pub data: Vec<Row>,
}

/// Denormalized cache summary: the single source of truth for "what
/// files exist and how many records total". Kept consistent with the
/// data store on every save/delete so statistics never require a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub files: Vec<StoredFile>,
    pub total_records: u64,
    pub last_updated: DateTime<Utc>,
}

impl CacheMetadata {
    /// Well-formed empty ledger (used before the first save and after
    /// a cache clear).
    pub fn empty() -> Self {
        Self {
            files: Vec::new(),
            total_records: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Cache statistics derived purely from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_files: u64,
    pub total_records: u64,
    pub total_size_bytes: u64,
    /// Distinct years present, ascending
    pub years: Vec<i32>,
    /// Distinct record types present, ascending
    pub record_types: Vec<String>,
}

impl CacheStats {
    /// Derive statistics from a ledger snapshot.
    pub fn from_metadata(metadata: &CacheMetadata) -> Self {
        let mut years: Vec<i32> = metadata.files.iter().map(|f| f.year).collect();
        years.sort_unstable();
        years.dedup();

        let mut record_types: Vec<String> =
            metadata.files.iter().map(|f| f.record_type.clone()).collect();
        record_types.sort_unstable();
        record_types.dedup();

        Self {
            total_files: metadata.files.len() as u64,
            total_records: metadata.total_records,
            total_size_bytes: metadata.files.iter().map(|f| f.size_bytes).sum(),
            years,
            record_types,
        }
    }
}
