//! Common error types for the SICOP analytics cache

use thiserror::Error;

/// Common result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the SICOP workspace
#[derive(Error, Debug)]
pub enum Error {
    /// Storage engine rejected a read or write (wraps sqlx::Error).
    /// Surfaced to the caller unmodified; never retried internally.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested id has no corresponding record. Soft on lookups
    /// (those return None instead), hard on deletes.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A bulk load matched zero cached files. Consolidation itself
    /// returns an empty result instead of raising this.
    #[error("No cached files match the requested filters: {0}")]
    EmptySelection(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
