//! HTTP handlers for the data service

mod consolidated;
mod health;
mod reports;
mod stats;

pub use consolidated::{get_consolidated, get_consolidated_csv};
pub use health::health_check;
pub use reports::get_sync_report;
pub use stats::{get_metadata, get_stats};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sicop_common::Error;

/// Handler error: maps the workspace error taxonomy onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::EmptySelection(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}
