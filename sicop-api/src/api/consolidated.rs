//! Consolidated query endpoints
//!
//! Thin HTTP surface over the consolidation engine: query parameters
//! select years/months/types and shaping, the engine does the rest.

use super::ApiError;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sicop_common::Error;
use sicop_engine::consolidate::{
    consolidate, export_consolidated_csv, ConsolidateOptions, ConsolidatedResult, SortOrder,
};

/// Query parameters for consolidated queries. List dimensions are
/// comma-separated, e.g. `years=2023,2024&types=Contracts`.
#[derive(Debug, Default, Deserialize)]
pub struct ConsolidateQuery {
    pub years: Option<String>,
    pub months: Option<String>,
    pub types: Option<String>,
    pub deduplicate_by: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ConsolidateQuery {
    fn into_options(self) -> Result<ConsolidateOptions, Error> {
        let years = parse_list::<i32>("years", self.years.as_deref())?;
        let months = parse_list::<u32>("months", self.months.as_deref())?;
        let types = self
            .types
            .as_deref()
            .map(|text| {
                text.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let sort_order = match self.sort_order.as_deref() {
            None | Some("asc") => SortOrder::Ascending,
            Some("desc") => SortOrder::Descending,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "sort_order must be asc or desc, got '{other}'"
                )))
            }
        };

        Ok(ConsolidateOptions {
            years,
            months,
            types,
            deduplicate_by: self.deduplicate_by,
            sort_by: self.sort_by,
            sort_order,
        })
    }
}

fn parse_list<T: std::str::FromStr>(name: &str, text: Option<&str>) -> Result<Vec<T>, Error> {
    let Some(text) = text else {
        return Ok(Vec::new());
    };

    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<T>()
                .map_err(|_| Error::InvalidInput(format!("invalid {name} value '{part}'")))
        })
        .collect()
}

/// GET /api/consolidate
///
/// Consolidated rows plus metadata as JSON.
pub async fn get_consolidated(
    State(state): State<AppState>,
    Query(query): Query<ConsolidateQuery>,
) -> Result<Json<ConsolidatedResult>, ApiError> {
    let options = query.into_options()?;
    let result = consolidate(&state.store, &options).await?;
    Ok(Json(result))
}

/// GET /api/consolidate.csv
///
/// The same selection as a CSV download.
pub async fn get_consolidated_csv(
    State(state): State<AppState>,
    Query(query): Query<ConsolidateQuery>,
) -> Result<Response, ApiError> {
    let options = query.into_options()?;
    let text = export_consolidated_csv(&state.store, &options).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"consolidated.csv\"",
            ),
        ],
        text,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_lists_parse() {
        let query = ConsolidateQuery {
            years: Some("2023, 2024".to_string()),
            months: Some("1".to_string()),
            types: Some("Contracts,Suppliers".to_string()),
            sort_order: Some("desc".to_string()),
            ..Default::default()
        };
        let options = query.into_options().unwrap();
        assert_eq!(options.years, vec![2023, 2024]);
        assert_eq!(options.months, vec![1]);
        assert_eq!(options.types, vec!["Contracts", "Suppliers"]);
        assert_eq!(options.sort_order, SortOrder::Descending);
    }

    #[test]
    fn bad_values_are_invalid_input() {
        let query = ConsolidateQuery {
            years: Some("twenty".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            query.into_options(),
            Err(Error::InvalidInput(_))
        ));

        let query = ConsolidateQuery {
            sort_order: Some("sideways".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.into_options(), Err(Error::InvalidInput(_))));
    }
}
