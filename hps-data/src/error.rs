/// Error types for table handling, checkpointing and merging
use hps_sites::SiteError;
use thiserror::Error;

/// Main error type for hps-data operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Failed to read or write CSV data
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required column is absent from a table header
    #[error("Missing column '{column}' in {source_name}")]
    MissingColumn { column: String, source_name: String },

    /// A latitude or longitude field is not a finite number
    #[error("Invalid coordinate '{value}' in {source_name}")]
    InvalidCoordinate { value: String, source_name: String },

    /// The temporary file could not be renamed over its target
    #[error("Failed to persist {path}: {reason}")]
    Persist { path: String, reason: String },

    /// Credentials expired and could not be refreshed
    #[error("Credential refresh failed: {0}")]
    CredentialRefresh(#[source] SiteError),

    /// Merge was called without any tables
    #[error("No indicator tables to merge")]
    EmptyMerge,
}

/// Result type alias for hps-data operations
pub type Result<T> = std::result::Result<T, DataError>;
