//! Error types for the reconciliation core

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory column could not be discovered in an input file
    #[error("Missing column '{column}' in {file}")]
    MissingColumn {
        /// Source file name
        file: String,
        /// Canonical column name
        column: String,
    },

    /// An amount cell could not be parsed; rejects the whole file
    #[error("Unparseable amount '{value}' in {file} row {row}")]
    AmountParse {
        /// Source file name
        file: String,
        /// Zero-based data row index
        row: usize,
        /// Offending cell value
        value: String,
    },

    /// A date cell could not be parsed; rejects the whole file
    #[error("Unparseable date '{value}' in {file} row {row}")]
    DateParse {
        /// Source file name
        file: String,
        /// Zero-based data row index
        row: usize,
        /// Offending cell value
        value: String,
    },

    /// A file is structurally unreadable (bad CSV framing, corrupt XLSX)
    #[error("Unreadable file {path}: {reason}")]
    UnreadableFile {
        /// Path of the offending file
        path: String,
        /// Underlying reader error
        reason: String,
    },

    /// An engine step failed; the cycle aborts with no state written
    #[error("Engine error: {0}")]
    Engine(String),

    /// Cancellation was requested; the cycle aborted at a step boundary
    #[error("Cycle cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
