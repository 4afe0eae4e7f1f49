//! Cache statistics and metadata endpoints
//!
//! Both read the ledger only; neither scans stored payloads.

use super::ApiError;
use crate::AppState;
use axum::{extract::State, Json};
use sicop_common::{CacheMetadata, CacheStats};

/// GET /api/stats
///
/// Cache statistics derived from the ledger.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<CacheStats>, ApiError> {
    let stats = state.store.get_cache_stats().await?;
    Ok(Json(stats))
}

/// GET /api/metadata
///
/// The full ledger: every stored file descriptor plus totals.
pub async fn get_metadata(
    State(state): State<AppState>,
) -> Result<Json<CacheMetadata>, ApiError> {
    let metadata = state.store.get_metadata().await?;
    Ok(Json(metadata))
}
