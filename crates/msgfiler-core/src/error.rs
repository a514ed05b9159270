//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur while loading the pipeline's inputs.
///
/// The pipeline stages themselves never return this type: metadata
/// extraction reports [`crate::MetadataOutcome`] tags and file operations
/// report [`crate::FileOperationOutcome`].
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Known-senders table could not be read.
    #[error("Known-senders table error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
