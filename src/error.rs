use thiserror::Error;

use crate::store::StoreError;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by ingestion functions.
///
/// Every variant except [`IngestionError::ConfigLoad`] is scoped to a single file: the
/// orchestrator records it against that file and moves on to the next one.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The configuration file could not be read or parsed.
    #[error("failed to load configuration: {message}")]
    ConfigLoad { message: String },

    /// A file entry is incomplete or carries an invalid option.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The `compression` option names a codec that is not `gzip`, `zip` or `none`.
    #[error("unsupported compression format '{value}' (expected gzip, zip or none)")]
    UnsupportedCompression { value: String },

    /// The `type` option names a format that is not `csv` or `json`.
    #[error("unsupported file type '{value}' (expected csv or json)")]
    UnsupportedFormat { value: String },

    /// The input could not be opened (missing object/path, unreachable host, bad archive).
    #[error("transport error for '{url}': {message}")]
    Transport { url: String, message: String },

    /// Underlying I/O error while reading an already opened stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader failure that is not a row-level problem.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON input. JSON has no row-level tolerance, so this aborts the file.
    #[error("invalid json at byte {offset}: {message}")]
    Json { offset: u64, message: String },

    /// The backing store rejected or failed to acknowledge a statement.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IngestionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }
}
