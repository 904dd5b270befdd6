//! Structured error types for the Halcyon engine.

use thiserror::Error;

/// Unified error type for all Halcyon operations.
///
/// Configuration problems (bad kernel shape, mismatched dimensions,
/// malformed persisted state) surface as errors from constructors and
/// restore functions. Proposal-time rejections are never errors: an
/// operator that cannot produce a legal move returns negative infinity
/// from `propose` instead.
#[derive(Debug, Error)]
pub enum HalcyonError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed persisted state or input data)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range values, dimension mismatch)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the Halcyon crates.
pub type Result<T> = std::result::Result<T, HalcyonError>;
