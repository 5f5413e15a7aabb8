//! Error types for rollback operations

use thiserror::Error;

/// Result type for rollback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Rollback errors
#[derive(Error, Debug)]
pub enum Error {
    /// Core error (persistence, atomic writes)
    #[error("Core error: {0}")]
    Core(#[from] recon_core::Error),

    /// Another rollback holds the per-run lock
    #[error("Rollback busy: {0}")]
    Busy(String),

    /// A precondition failed; never a silent no-op
    #[error("Rollback not allowed: {0}")]
    ValidationRefused(String),

    /// An invalid cycle identifier was requested
    #[error("Invalid cycle '{0}'; valid cycles are 1C through 10C")]
    InvalidCycle(String),

    /// A required artefact is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A history record attempted an illegal status transition
    #[error("Illegal status transition for {rollback_id}: {from} -> {to}")]
    IllegalTransition {
        /// History record involved
        rollback_id: String,
        /// Current status
        from: String,
        /// Requested status
        to: String,
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
