//! Error types for report emission

use thiserror::Error;

/// Result type for reporting operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reporting errors
#[derive(Error, Debug)]
pub enum Error {
    /// Core error (persistence, atomic writes)
    #[error("Core error: {0}")]
    Core(#[from] recon_core::Error),

    /// CSV serialization error
    #[error("CSV error: {0}")]
    Csv(String),

    /// XLSX generation error
    #[error("XLSX error: {0}")]
    Xlsx(String),

    /// An Annexure IV record failed field validation
    #[error("Annexure record {index} invalid: {reason}")]
    AnnexureValidation {
        /// Zero-based record index in the batch
        index: usize,
        /// What failed
        reason: String,
    },

    /// Duplicate Bankadjref within one Annexure file
    #[error("Duplicate Bankadjref: {0}")]
    DuplicateBankAdjRef(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Error::Xlsx(err.to_string())
    }
}
