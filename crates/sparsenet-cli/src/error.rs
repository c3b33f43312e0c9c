//! Error handling for the sparsenet CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Engine setup or configuration error
    #[error("Engine error: {0}")]
    Engine(#[from] sparsenet_engine::EngineError),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] sparsenet_storage::StorageError),

    /// Run stopped on an error; the partial trajectory was still written
    #[error("Run failed after {steps_completed} steps: {source}")]
    RunFailed {
        /// Steps completed before the failure
        steps_completed: u64,
        /// Underlying engine error
        #[source]
        source: sparsenet_engine::EngineError,
    },

    /// Some sweep members failed
    #[error("{failed} of {total} sweep runs failed")]
    SweepFailed {
        /// Failed runs
        failed: usize,
        /// All runs
        total: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("Error: {0}")]
    Generic(#[from] anyhow::Error),

    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }
}
