//! Error types for the index.

use std::io;
use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, VsTreeError>;

/// Everything that can go wrong opening or operating on an index.
#[derive(Debug, Error)]
pub enum VsTreeError {
    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A vector's length did not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was opened with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// An on-disk node or meta payload failed to decode.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// A caller-supplied argument or configuration value was invalid.
    #[error("invalid argument: {0}")]
    Invalid(String),
}
