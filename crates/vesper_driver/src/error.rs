//! Error types for driver runs and watch mode.

use vesper_engine::EngineError;

/// Fatal failures of a driver invocation or the watch loop.
///
/// Everything else — cache directory problems, malformed indices,
/// per-entry restore failures — degrades with a warning instead of
/// surfacing here.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Hierarchy elaboration failed.
    #[error("elaboration failed: {0}")]
    Elaboration(#[source] EngineError),

    /// The transform pipeline failed.
    #[error("synthesis pipeline failed: {0}")]
    Pipeline(#[source] EngineError),

    /// The initial source read of a watch session failed.
    #[error("source read failed: {0}")]
    Source(#[source] EngineError),

    /// The watcher was started without any files.
    #[error("no files given to watch")]
    NoWatchFiles,
}
