//! Metadata ledger persistence
//!
//! The ledger is one well-known record summarizing every stored file.
//! Listing and statistics read it instead of scanning `dataset_files`.
//!
//! Only the store's save/delete/clear operations may write it, always
//! inside the same transaction as the data mutation and under the
//! store's ledger mutex. The read-modify-write here is the critical
//! section the concurrency model requires: two saves that both read the
//! old ledger and wrote back would lose one file entry.

use chrono::{DateTime, Utc};
use sicop_common::{CacheMetadata, Error, Result};
use sqlx::SqliteConnection;

/// Read the current ledger. Returns an empty, well-formed ledger when
/// the record has never been written.
pub async fn read_ledger(conn: &mut SqliteConnection) -> Result<CacheMetadata> {
    let row: Option<(String, i64, String)> = sqlx::query_as(
        "SELECT files, total_records, last_updated FROM cache_metadata WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some((files, total_records, last_updated)) => Ok(CacheMetadata {
            files: serde_json::from_str(&files)?,
            total_records: total_records.max(0) as u64,
            last_updated: parse_timestamp(&last_updated)?,
        }),
        None => Ok(CacheMetadata::empty()),
    }
}

/// Write the ledger record, replacing any previous one.
pub async fn write_ledger(conn: &mut SqliteConnection, metadata: &CacheMetadata) -> Result<()> {
    let files = serde_json::to_string(&metadata.files)?;

    sqlx::query(
        r#"
        INSERT INTO cache_metadata (id, files, total_records, last_updated)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            files = excluded.files,
            total_records = excluded.total_records,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(files)
    .bind(metadata.total_records as i64)
    .bind(metadata.last_updated.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Parse a persisted RFC 3339 timestamp
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("corrupt timestamp '{value}': {e}")))
}
