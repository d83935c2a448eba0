//! Error types for geoip-enrich.

use thiserror::Error;

/// Error type for enrichment runs.
///
/// Per-row lookup misses and malformed addresses never surface here; they
/// degrade to empty fields inside the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing database, unwritable output, bad options)
    #[error("configuration error: {0}")]
    Config(String),

    /// No IP column configured and none could be detected
    #[error("failed to auto-detect IP column; specify one explicitly")]
    IpColumnNotDetected,

    /// Explicitly named column is absent from the table
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Inserted column name already exists in the table
    #[error("column '{0}' already exists in the input; choose another name for the inserted column")]
    SchemaCollision(String),

    /// Input header repeats a column name
    #[error("duplicate column name in input header: {0}")]
    DuplicateColumn(String),

    /// GeoIP database could not be decoded
    #[error("GeoIP error: {0}")]
    GeoIp(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for geoip-enrich operations.
pub type Result<T> = std::result::Result<T, Error>;
