//! sicop-api library - read-only data service
//!
//! Serves cache statistics, consolidated queries and sync reports to
//! dashboard frontends. Handlers never mutate the cache; ingest and
//! deletion go through the CLI.

use axum::Router;
use sicop_cache::RecordStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Record store over a read-only pool
    pub store: RecordStore,
}

impl AppState {
    /// Create new application state
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/health", get(api::health_check))
        .route("/api/stats", get(api::get_stats))
        .route("/api/metadata", get(api::get_metadata))
        .route("/api/consolidate", get(api::get_consolidated))
        .route("/api/consolidate.csv", get(api::get_consolidated_csv))
        .route("/api/sync-report", get(api::get_sync_report))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
