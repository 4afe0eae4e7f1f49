//! Database initialization
//!
//! Creates the cache database and its tables on first run. All schema
//! statements are idempotent, so repeated initialization of the same
//! database is a no-op.

use sicop_common::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the cache database, creating the file and schema if needed.
///
/// The returned pool is the process-wide storage handle: open it once at
/// startup and share it. WAL mode allows concurrent readers alongside the
/// single writer.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new cache database: {}", db_path.display());
    } else {
        info!("Opened existing cache database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode: concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory cache database.
///
/// Single-connection pool: each SQLite `:memory:` connection is its own
/// database, so the pool must never hand out a second one.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_dataset_files_table(pool).await?;
    create_cache_metadata_table(pool).await?;
    create_custom_data_table(pool).await?;
    Ok(())
}

/// Create the dataset_files table
///
/// One row per uploaded dataset: descriptor columns plus the serialized
/// payload. The composite indexes back every lookup path of the store's
/// index decision table.
async fn create_dataset_files_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dataset_files (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            record_type TEXT NOT NULL,
            upload_date TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            record_count INTEGER NOT NULL,
            payload TEXT NOT NULL,
            CHECK (month >= 1 AND month <= 12),
            CHECK (size_bytes >= 0),
            CHECK (record_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dataset_files_year ON dataset_files(year)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dataset_files_type ON dataset_files(record_type)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dataset_files_year_month ON dataset_files(year, month)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dataset_files_year_type ON dataset_files(year, record_type)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the cache_metadata table
///
/// Holds the single ledger record (id = 1). The `files` column is the
/// serialized list of stored-file descriptors.
async fn create_cache_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_metadata (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            files TEXT NOT NULL,
            total_records INTEGER NOT NULL,
            last_updated TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the custom_data table
///
/// Side namespace for small opaque blobs (UI configuration and the
/// like). Not part of the stored-file model and excluded from cache
/// statistics.
async fn create_custom_data_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS custom_data (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
