//! Error types for the matching engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Matching engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Core error (normalization, persistence)
    #[error("Core error: {0}")]
    Core(#[from] recon_core::Error),

    /// A matching config referenced a field the engine cannot compare
    #[error("Matching config error: {0}")]
    MatchingConfig(String),

    /// An ordering step failed; the cycle aborts with no state written
    #[error("Step {step} failed: {reason}")]
    Step {
        /// Step number (0 through 8)
        step: u8,
        /// What went wrong
        reason: String,
    },

    /// Cancellation was observed at a step boundary
    #[error("Cycle cancelled")]
    Cancelled,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
