//! Error types for settlement accounting

use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Core error (persistence, atomic writes)
    #[error("Core error: {0}")]
    Core(#[from] recon_core::Error),

    /// Report emission error (TTUM/GL files)
    #[error("Emission error: {0}")]
    Emission(#[from] reporting::Error),

    /// A voucher failed the double-entry balance check
    #[error("Voucher {voucher_id} unbalanced: debit {debit} vs credit {credit}")]
    Unbalanced {
        /// Offending voucher
        voucher_id: String,
        /// Total debits
        debit: rust_decimal::Decimal,
        /// Total credits
        credit: rust_decimal::Decimal,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

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
