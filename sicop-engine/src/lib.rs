//! # SICOP Engine
//!
//! Consolidation and analysis layer over the record store: merges cached
//! datasets into query-ready row sets, filters and aggregates them,
//! compares periods, exports CSV, and validates the cache against the
//! record-type registry.
//!
//! Everything here operates on transient copies fetched fresh from the
//! store per call; nothing is persisted unless the caller explicitly
//! saves a consolidated result back as a new cached file.

pub mod consolidate;
pub mod csv;
pub mod filter;
pub mod loader;
pub mod validate;
pub mod value;

pub use consolidate::{
    consolidate, consolidate_all, consolidate_by_month, consolidate_by_type,
    consolidate_by_year, consolidate_by_year_range, AggregateFn, ConsolidateOptions,
    ConsolidatedResult, SortOrder,
};
pub use filter::{FilterCriteria, FilterOperator, Period, Trend, TREND_DEAD_ZONE_PCT};
pub use validate::{generate_sync_report, SyncReport};
