//! Record store: durable, indexed storage of uploaded datasets
//!
//! Every operation that touches the database is an await point; the
//! transforms downstream of this crate are pure. Saves and deletes
//! update the payload table and the metadata ledger inside one SQLite
//! transaction, serialized through a single mutex so concurrent callers
//! cannot lose ledger updates.

use crate::ledger::{self, parse_timestamp};
use chrono::Utc;
use serde_json::Value;
use sicop_common::model::{CacheMetadata, CacheStats, Row, StoredData, StoredFile};
use sicop_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row as _, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const FILE_COLUMNS: &str =
    "id, file_name, year, month, record_type, upload_date, size_bytes, record_count, payload";

/// Filter over the stored-file dimensions. `None` leaves a dimension
/// unconstrained; all `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub record_type: Option<String>,
}

/// Index chosen for a filtered lookup.
///
/// The decision table is explicit so the optimization stays intentional
/// and testable rather than ad hoc branching: the most selective
/// composite index available for the supplied dimensions wins, and the
/// remaining dimensions filter within the indexed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileIndex {
    /// `(year, month)` composite index
    YearMonth,
    /// `(year, record_type)` composite index
    YearType,
    /// Single-column `year` index
    Year,
    /// Single-column `record_type` index
    Type,
    /// No suitable index; full table scan
    FullScan,
}

impl FileIndex {
    /// Name of the backing SQLite index, if any
    pub fn sqlite_name(&self) -> Option<&'static str> {
        match self {
            FileIndex::YearMonth => Some("idx_dataset_files_year_month"),
            FileIndex::YearType => Some("idx_dataset_files_year_type"),
            FileIndex::Year => Some("idx_dataset_files_year"),
            FileIndex::Type => Some("idx_dataset_files_type"),
            FileIndex::FullScan => None,
        }
    }
}

impl FileFilter {
    /// Index decision table:
    ///
    /// | year | month | type | index      |
    /// |------|-------|------|------------|
    /// | yes  | yes   | any  | year+month |
    /// | yes  | no    | yes  | year+type  |
    /// | yes  | no    | no   | year       |
    /// | no   | any   | yes  | type       |
    /// | no   | any   | no   | full scan  |
    pub fn choose_index(&self) -> FileIndex {
        match (self.year, self.month, self.record_type.as_deref()) {
            (Some(_), Some(_), _) => FileIndex::YearMonth,
            (Some(_), None, Some(_)) => FileIndex::YearType,
            (Some(_), None, None) => FileIndex::Year,
            (None, _, Some(_)) => FileIndex::Type,
            (None, _, None) => FileIndex::FullScan,
        }
    }
}

/// Durable store of uploaded datasets.
///
/// Cheap to clone; clones share the pool and the ledger mutex.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
    ledger_lock: Arc<Mutex<()>>,
}

impl RecordStore {
    /// Wrap an initialized database pool (see [`crate::db::init_database`]).
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            ledger_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying pool (read-only consumers such as the data service)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist one uploaded dataset and update the ledger, atomically.
    ///
    /// `size_bytes` and `record_count` are computed here, once; they are
    /// trusted cache metadata from then on. Returns the new file id.
    pub async fn save_file(
        &self,
        file_name: &str,
        rows: &[Row],
        year: i32,
        month: u32,
        record_type: &str,
    ) -> Result<String> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidInput(format!("month out of range: {month}")));
        }
        if record_type.is_empty() {
            return Err(Error::InvalidInput("record type must not be empty".to_string()));
        }

        let uploaded = Utc::now();
        let payload = serde_json::to_string(rows)?;
        let file_info = StoredFile {
            id: StoredFile::make_id(record_type, year, month, uploaded),
            file_name: file_name.to_string(),
            year,
            month,
            record_type: record_type.to_string(),
            upload_date: uploaded,
            size_bytes: payload.len() as u64,
            record_count: rows.len() as u64,
        };

        // Critical section: ledger read-modify-write must not interleave
        // with another save or delete.
        let _guard = self.ledger_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO dataset_files
                (id, file_name, year, month, record_type, upload_date,
                 size_bytes, record_count, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file_info.id)
        .bind(&file_info.file_name)
        .bind(file_info.year)
        .bind(file_info.month)
        .bind(&file_info.record_type)
        .bind(file_info.upload_date.to_rfc3339())
        .bind(file_info.size_bytes as i64)
        .bind(file_info.record_count as i64)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        let mut metadata = ledger::read_ledger(&mut tx).await?;
        metadata.files.push(file_info.clone());
        metadata.total_records += file_info.record_count;
        metadata.last_updated = uploaded;
        ledger::write_ledger(&mut tx, &metadata).await?;

        tx.commit().await?;

        info!(
            "Saved {} ({} rows, {} bytes) as {}",
            file_info.file_name, file_info.record_count, file_info.size_bytes, file_info.id
        );

        Ok(file_info.id)
    }

    /// Point lookup by id. Absent ids are a soft condition: `None`.
    pub async fn get_file(&self, id: &str) -> Result<Option<StoredData>> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM dataset_files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| stored_data_from_row(&r)).transpose()
    }

    /// All files of one calendar year
    pub async fn get_files_by_year(&self, year: i32) -> Result<Vec<StoredData>> {
        self.get_filtered_files(&FileFilter {
            year: Some(year),
            ..Default::default()
        })
        .await
    }

    /// All files of one (year, month) period
    pub async fn get_files_by_month(&self, year: i32, month: u32) -> Result<Vec<StoredData>> {
        self.get_filtered_files(&FileFilter {
            year: Some(year),
            month: Some(month),
            record_type: None,
        })
        .await
    }

    /// All files of one record type
    pub async fn get_files_by_type(&self, record_type: &str) -> Result<Vec<StoredData>> {
        self.get_filtered_files(&FileFilter {
            record_type: Some(record_type.to_string()),
            ..Default::default()
        })
        .await
    }

    /// All files of one record type within one year
    pub async fn get_files_by_year_and_type(
        &self,
        year: i32,
        record_type: &str,
    ) -> Result<Vec<StoredData>> {
        self.get_filtered_files(&FileFilter {
            year: Some(year),
            month: None,
            record_type: Some(record_type.to_string()),
        })
        .await
    }

    /// Filtered lookup over any subset of the (year, month, type)
    /// dimensions. Uses the index decision table; an empty filter
    /// returns everything.
    pub async fn get_filtered_files(&self, filter: &FileFilter) -> Result<Vec<StoredData>> {
        let index = filter.choose_index();
        debug!("file filter {:?} -> {:?}", filter, index);

        let mut sql = format!("SELECT {FILE_COLUMNS} FROM dataset_files");
        if let Some(name) = index.sqlite_name() {
            sql.push_str(" INDEXED BY ");
            sql.push_str(name);
        }

        let mut clauses: Vec<&str> = Vec::new();
        if filter.year.is_some() {
            clauses.push("year = ?");
        }
        if filter.month.is_some() {
            clauses.push("month = ?");
        }
        if filter.record_type.is_some() {
            clauses.push("record_type = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut query = sqlx::query(&sql);
        if let Some(year) = filter.year {
            query = query.bind(year);
        }
        if let Some(month) = filter.month {
            query = query.bind(month);
        }
        if let Some(record_type) = &filter.record_type {
            query = query.bind(record_type);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(stored_data_from_row).collect()
    }

    /// Multi-value generalization used by the consolidation layer:
    /// a file matches when its year is in `years` (or `years` is empty),
    /// AND its month is in `months` (or empty), AND its type is in
    /// `types` (or empty). Results come back in upload order so
    /// consolidation output is deterministic.
    pub async fn get_files_matching(
        &self,
        years: &[i32],
        months: &[u32],
        types: &[String],
    ) -> Result<Vec<StoredData>> {
        let mut sql = format!("SELECT {FILE_COLUMNS} FROM dataset_files");

        let mut clauses: Vec<String> = Vec::new();
        if !years.is_empty() {
            clauses.push(format!("year IN ({})", placeholders(years.len())));
        }
        if !months.is_empty() {
            clauses.push(format!("month IN ({})", placeholders(months.len())));
        }
        if !types.is_empty() {
            clauses.push(format!("record_type IN ({})", placeholders(types.len())));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY upload_date, id");

        let mut query = sqlx::query(&sql);
        for year in years {
            query = query.bind(year);
        }
        for month in months {
            query = query.bind(month);
        }
        for record_type in types {
            query = query.bind(record_type);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(stored_data_from_row).collect()
    }

    /// Delete one file and its ledger entry, atomically.
    /// Unlike lookups, an absent id here is a hard error.
    pub async fn delete_file(&self, id: &str) -> Result<()> {
        let _guard = self.ledger_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM dataset_files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound(format!("no cached file with id {id}")));
        }

        let mut metadata = ledger::read_ledger(&mut tx).await?;
        if let Some(position) = metadata.files.iter().position(|f| f.id == id) {
            let removed = metadata.files.remove(position);
            metadata.total_records = metadata.total_records.saturating_sub(removed.record_count);
        }
        metadata.last_updated = Utc::now();
        ledger::write_ledger(&mut tx, &metadata).await?;

        tx.commit().await?;

        info!("Deleted cached file {id}");
        Ok(())
    }

    /// Delete every file of one year. Repeated single deletes: each is
    /// atomic, the batch as a whole is not, so a partial failure leaves
    /// the ledger consistent with whatever remains.
    pub async fn delete_files_by_year(&self, year: i32) -> Result<u64> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM dataset_files WHERE year = ?")
            .bind(year)
            .fetch_all(&self.pool)
            .await?;
        let count = ids.len() as u64;
        for id in ids {
            self.delete_file(&id).await?;
        }
        Ok(count)
    }

    /// Delete every file of one (year, month) period
    pub async fn delete_files_by_month(&self, year: i32, month: u32) -> Result<u64> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM dataset_files WHERE year = ? AND month = ?")
                .bind(year)
                .bind(month)
                .fetch_all(&self.pool)
                .await?;
        let count = ids.len() as u64;
        for id in ids {
            self.delete_file(&id).await?;
        }
        Ok(count)
    }

    /// Empty the data store and reset the ledger. Idempotent; the
    /// custom-data side namespace is untouched.
    pub async fn clear_cache(&self) -> Result<()> {
        let _guard = self.ledger_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM dataset_files")
            .execute(&mut *tx)
            .await?;
        ledger::write_ledger(&mut tx, &CacheMetadata::empty()).await?;

        tx.commit().await?;

        info!("Cache cleared");
        Ok(())
    }

    /// Current ledger; empty-but-well-formed when never initialized
    pub async fn get_metadata(&self) -> Result<CacheMetadata> {
        let mut conn = self.pool.acquire().await?;
        ledger::read_ledger(&mut conn).await
    }

    /// Statistics derived purely from the ledger (no data-store scan)
    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        let metadata = self.get_metadata().await?;
        Ok(CacheStats::from_metadata(&metadata))
    }

    /// Store a small opaque blob outside the file model
    pub async fn set_custom_value(&self, key: &str, value: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO custom_data (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a custom blob; `None` when absent
    pub async fn get_custom_value(&self, key: &str) -> Result<Option<Value>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM custom_data WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match value {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Remove a custom blob. Removing an absent key is not an error.
    pub async fn delete_custom_value(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM custom_data WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn stored_data_from_row(row: &SqliteRow) -> Result<StoredData> {
    let id: String = row.get("id");
    let upload_date: String = row.get("upload_date");
    let payload: String = row.get("payload");

    let file_info = StoredFile {
        id: id.clone(),
        file_name: row.get("file_name"),
        year: row.get("year"),
        month: row.get::<i64, _>("month") as u32,
        record_type: row.get("record_type"),
        upload_date: parse_timestamp(&upload_date)?,
        size_bytes: row.get::<i64, _>("size_bytes") as u64,
        record_count: row.get::<i64, _>("record_count") as u64,
    };
    let data: Vec<Row> = serde_json::from_str(&payload)?;

    Ok(StoredData {
        id,
        file_info,
        data,
    })
}
