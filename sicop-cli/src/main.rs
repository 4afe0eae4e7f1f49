//! sicop - operator tool for the SICOP analytics cache
//!
//! Ingests CSV exports into the local cache and manages it: listing,
//! statistics, deletion, consolidated export, validation and period
//! comparison. The read-only data service (`sicop-api`) serves the
//! same cache to dashboards.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

mod commands;

/// Command-line arguments for sicop
#[derive(Parser, Debug)]
#[command(name = "sicop")]
#[command(about = "Local analytics cache for SICOP procurement data")]
#[command(version)]
struct Args {
    /// Data folder holding the cache database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a CSV export and cache it under (year, month, type)
    Ingest {
        /// CSV file to ingest
        file: PathBuf,
        /// Calendar year the data belongs to
        #[arg(long)]
        year: i32,
        /// Month 1-12
        #[arg(long)]
        month: u32,
        /// Record type tag, e.g. Contracts
        #[arg(long = "type")]
        record_type: String,
        /// Display name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// List cached files from the ledger
    List,
    /// Cache statistics from the ledger
    Stats,
    /// Delete cached files by id, year, or year and month
    Delete {
        #[arg(long, conflicts_with_all = ["year", "month"])]
        id: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, requires = "year")]
        month: Option<u32>,
    },
    /// Empty the cache (custom data is kept)
    Clear,
    /// Export a consolidated selection as CSV
    Export {
        /// Output file path
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long, value_delimiter = ',')]
        years: Vec<i32>,
        #[arg(long, value_delimiter = ',')]
        months: Vec<u32>,
        #[arg(long = "types", value_delimiter = ',')]
        types: Vec<String>,
        /// Keep only the first row per distinct value of this field
        #[arg(long)]
        deduplicate_by: Option<String>,
        #[arg(long)]
        sort_by: Option<String>,
        /// Sort descending instead of ascending
        #[arg(long, requires = "sort_by")]
        desc: bool,
    },
    /// Validate the cache against the expected record types
    Validate,
    /// Compare a summed field between two periods (YYYY or YYYY-MM)
    Compare {
        period1: String,
        period2: String,
        #[arg(long = "type")]
        record_type: String,
        #[arg(long)]
        field: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sicop=info".into()),
        )
        .init();

    let args = Args::parse();

    let data_dir = sicop_common::config::resolve_data_dir(
        args.data_dir.as_deref().and_then(|p| p.to_str()),
    );
    sicop_common::config::ensure_data_dir(&data_dir)?;
    let db_path = sicop_common::config::database_path(&data_dir);
    info!("Cache database: {}", db_path.display());

    let pool = sicop_cache::db::init_database(&db_path).await?;
    let store = sicop_cache::RecordStore::new(pool);

    match args.command {
        Command::Ingest {
            file,
            year,
            month,
            record_type,
            name,
        } => commands::ingest(&store, &file, year, month, &record_type, name).await,
        Command::List => commands::list(&store).await,
        Command::Stats => commands::stats(&store).await,
        Command::Delete { id, year, month } => commands::delete(&store, id, year, month).await,
        Command::Clear => commands::clear(&store).await,
        Command::Export {
            output,
            years,
            months,
            types,
            deduplicate_by,
            sort_by,
            desc,
        } => {
            commands::export(
                &store,
                &output,
                years,
                months,
                types,
                deduplicate_by,
                sort_by,
                desc,
            )
            .await
        }
        Command::Validate => commands::validate(&store).await,
        Command::Compare {
            period1,
            period2,
            record_type,
            field,
        } => commands::compare(&store, &period1, &period2, &record_type, &field).await,
    }
}
