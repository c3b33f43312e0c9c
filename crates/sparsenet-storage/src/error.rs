//! Error types for the storage layer

use sparsenet_engine::EngineError;
use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while exporting or importing run data
#[derive(Error, Debug)]
pub enum StorageError {
    /// Invalid magic number in binary format
    #[error("Invalid magic number: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// Expected magic number
        expected: [u8; 4],
        /// Found magic number
        found: [u8; 4],
    },

    /// Unsupported version
    #[error("Unsupported version: {version}, supported: {supported}")]
    UnsupportedVersion {
        /// Version found
        version: u32,
        /// Supported version
        supported: u32,
    },

    /// Checksum verification failed
    #[error("Checksum verification failed: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Invalid file format or corrupted data
    #[error("Invalid format: {reason}")]
    InvalidFormat {
        /// Reason for invalid format
        reason: String,
    },

    /// State value JSON cannot represent
    #[error("Non-finite state at node {node} ({}); JSON cannot represent it, export as bincode", sample_label(.time))]
    NonFiniteState {
        /// Sample time, `None` for the initial state
        time: Option<u64>,
        /// Node index
        node: usize,
    },

    /// Decoded data violates an engine invariant
    #[error("Invalid content: {0}")]
    Engine(#[from] EngineError),

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Source I/O error
        source: std::io::Error,
    },

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode encoding or decoding error
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

fn sample_label(time: &Option<u64>) -> String {
    match time {
        Some(t) => format!("time {}", t),
        None => "initial state".to_string(),
    }
}

impl StorageError {
    /// Create an invalid format error
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }
}
