//! sicop-api - read-only data service for SICOP dashboards
//!
//! Serves cache statistics, consolidated queries and sync reports over
//! HTTP. The cache itself is written by the CLI; this process opens the
//! database read-only.

use anyhow::Result;
use sicop_api::{build_router, db, AppState};
use sicop_cache::RecordStore;
use sicop_common::config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting SICOP data service (sicop-api) v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = config::resolve_data_dir(None);
    let db_path = config::database_path(&data_dir);
    info!("Cache database: {}", db_path.display());

    let pool = db::connect_readonly(&db_path).await?;
    info!("Connected to cache database (read-only)");

    let state = AppState::new(RecordStore::new(pool));
    let app = build_router(state);

    let port = config::resolve_api_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("sicop-api listening on http://127.0.0.1:{port}");
    info!("Health check: http://127.0.0.1:{port}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
