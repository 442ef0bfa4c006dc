//! Error types for the drive2d engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the episode run.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading, validation or flag parsing failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: drive2d_core::config::ConfigError,
    },

    /// The episode runner failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: drive2d_core::runner::RunnerError,
    },

    /// The frame sink failed when rendering was switched on.
    #[error("frame sink error: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: drive2d_core::sink::SinkError,
    },

    /// The run summary could not be serialized.
    #[error("summary serialization error: {source}")]
    Summary {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
