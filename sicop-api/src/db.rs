//! Read-only database access for the data service
//!
//! Safety: uses SQLite mode=ro so the service cannot write even by
//! accident; all mutation goes through the CLI.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

/// Connect to the cache database in read-only mode
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        anyhow::bail!(
            "Cache database not found: {}\nRun `sicop ingest` first to create it.",
            db_path.display()
        );
    }

    let db_url = format!("sqlite://{}?mode=ro", db_path.display());

    let pool = SqlitePool::connect(&db_url)
        .await
        .context("Failed to connect to cache database in read-only mode")?;

    Ok(pool)
}
