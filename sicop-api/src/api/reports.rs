//! Sync report endpoint

use super::ApiError;
use crate::AppState;
use axum::{extract::State, Json};
use sicop_engine::validate::{generate_sync_report, CombinedSyncReport};

/// GET /api/sync-report
///
/// Combined schema-sync and integrity report. Read-only diagnostic;
/// dashboards run it before a bulk load.
pub async fn get_sync_report(
    State(state): State<AppState>,
) -> Result<Json<CombinedSyncReport>, ApiError> {
    let report = generate_sync_report(&state.store).await?;
    Ok(Json(report))
}
