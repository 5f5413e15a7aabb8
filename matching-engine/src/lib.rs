//! UPI Matching Engine
//!
//! The eight-step ordered classifier at the heart of the reconciliation
//! rail. Each settlement cycle's CBS, Switch, and NPCI views are loaded
//! into arena-backed working tables with sticky `processed` flags; the
//! steps run in a fixed order, each consuming only what earlier steps
//! left behind:
//!
//! 1. Cut-off detection (hanging transactions)
//! 2. Self-matched auto-reversals
//! 3. Settlement lump entries
//! 4. Double debit/credit detection
//! 5. Three-way strict matching, tightest config first
//! 6. Deemed-accepted handling (TCC 102/103)
//! 7. NPCI declines
//! 8. Failed auto-credit reversals
//!
//! An adjustment pre-pass runs before step 1, carry-over entries from the
//! previous cycle are resolved or aged around it, and the exception
//! decision matrix assigns a terminal disposition to whatever remains.
//!
//! # Invariants
//!
//! - Step order is fixed; reordering changes the semantics
//! - Row iteration follows input insertion order (deterministic ties)
//! - A cancelled or failed cycle writes no state

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod engine;
pub mod error;
pub mod matrix;
pub mod results;
pub mod tables;

// Re-exports
pub use engine::{
    normalize_adjustments, AdjustmentRow, AdjustmentType, EngineInput, EngineOutcome,
    MatchingEngine,
};
pub use error::{Error, Result};
pub use matrix::{ExceptionMatrix, MatrixAction, SourceStatus};
pub use tables::{Marking, RowStatus, SourceTable};
