//! UPI Recon Core
//!
//! Canonical data model and shared services for the UPI reconciliation rail.
//!
//! # Architecture
//!
//! - **Canonical model**: every source row is coerced into one [`types::Txn`]
//! - **Normalizer**: three-layer column discovery over heterogeneous files
//! - **Run store**: the per-run output tree is the system of record; every
//!   JSON artefact is written via temp-file + fsync + atomic rename
//! - **Carry-over**: hanging transactions survive across settlement cycles
//! - **Audit trail**: append-only, date-rotated action log
//!
//! # Invariants
//!
//! - Amounts are exact decimals; equality uses a configured epsilon
//! - Each RRN yields at most one reconciliation record per cycle
//! - Persisted state is never left half-written under its primary path

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod audit;
pub mod carryover;
pub mod config;
pub mod error;
pub mod ingest;
pub mod lookup;
pub mod normalize;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use store::RunPaths;
pub use types::{
    CarryOverEntry, CarryOverState, Direction, DrCr, ExceptionType, MatchStatus, ReconOutput,
    ReconRecord, ResponseCode, Source, TccType, TtumType, Txn,
};
