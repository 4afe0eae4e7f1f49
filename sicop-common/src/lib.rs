//! # SICOP Common Library
//!
//! Shared code for the SICOP analytics cache workspace including:
//! - Error type used across all crates
//! - Data model (stored file descriptors, cache metadata, dynamic rows)
//! - Record-type registry (expected types and their unique-key fields)
//! - Configuration loading and data folder resolution

pub mod config;
pub mod error;
pub mod model;
pub mod registry;

pub use error::{Error, Result};
pub use model::{CacheMetadata, CacheStats, Row, StoredData, StoredFile};
