//! Error types for the cleaning stage.
//!
//! Row-level parse failures are not errors: the normalizers turn them into
//! nulls and the validation phase counts and drops them. Everything that
//! reaches [`CleanError`] is an infrastructure or configuration problem that
//! terminates the run.

use thiserror::Error;

/// The main error type for the cleaning stage.
#[derive(Error, Debug)]
pub enum CleanError {
    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from reading an input source.
    #[error("Data source error ({source_type}): {message}")]
    DataSource {
        /// Type of data source (e.g., "CSV", "Parquet")
        source_type: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required column is missing from an input relation.
    #[error("Column '{column}' not found in {table}")]
    ColumnNotFound { table: String, column: String },

    /// Malformed scratch key/value file.
    #[error("Scratch file error: {0}")]
    Scratch(String),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from serialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error while installing the logging subscriber.
    #[error("Logging setup error: {0}")]
    Logging(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, CleanError>`.
pub type Result<T> = std::result::Result<T, CleanError>;

impl CleanError {
    /// Creates a new data source error with a source error.
    pub fn data_source_with_source(
        source_type: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::DataSource {
            source_type: source_type.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a missing-column error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Returns true for infrastructure failures (engine, input, output).
    ///
    /// Configuration and logging errors happen before the stage starts and
    /// are reported to the caller without the stage's failure banner.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::Logging(_))
    }
}
