//! Error types shared across the crate.
//!
//! The scoring engine never errors; every fallible surface is a store,
//! config, or embedding boundary.

/// Crate-wide error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Caller supplied malformed query input
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// A write would break a data-model invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// Id does not exist in the tenant scope
    #[error("Not found: {0}")]
    NotFound(String),
    /// Optimistic counter update lost its retry
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Database error
    #[error("Database error: {0}")]
    Backend(#[from] rusqlite::Error),
    /// Embedding provider failed or is unreachable
    #[error("Embedding error: {0}")]
    Embedding(String),
    /// Cooperative cancellation before commit
    #[error("Operation cancelled")]
    Cancelled,
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Startup or configuration error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, MemoryError>;
