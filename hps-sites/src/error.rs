/// Error types for the site and indicator library
use thiserror::Error;

/// Main error type for site loading and remote indicator services
#[derive(Error, Debug)]
pub enum SiteError {
    /// Failed to parse CSV data
    #[error("Failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    /// Failed to read an input table
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A river geometry could not be parsed or has no coordinates
    #[error("Invalid river geometry: {0}")]
    Geometry(String),

    /// Indicator name not recognised
    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    /// Login or token refresh was rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP request failed
    #[cfg(feature = "api")]
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Failed to decode a raster response
    #[cfg(feature = "api")]
    #[error("Failed to decode raster: {0}")]
    Raster(String),
}

/// Type alias for Results using SiteError
pub type Result<T> = std::result::Result<T, SiteError>;
