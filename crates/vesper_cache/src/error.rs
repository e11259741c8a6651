//! Error types for cache persistence.
//!
//! Lookup paths are fail-safe and never produce these errors; they exist
//! for the explicit persistence operations the CLI can demand.

use std::path::PathBuf;

/// Errors from explicit cache persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The index document could not be serialized.
    #[error("cache index serialization failed: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// A persistence operation was attempted on an uninitialized cache.
    #[error("cache is not initialized")]
    NotInitialized,
}
