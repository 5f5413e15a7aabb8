//! Report Emitter
//!
//! Produces the regulator- and network-prescribed artefacts from a
//! finalised reconciliation result: pairwise matched reports, ageing and
//! hanging lists, and the NPCI Annexure IV adjustment files.
//!
//! # Emission discipline
//!
//! Every CSV is built in memory, staged to a temp file in the target
//! directory, fsynced, and atomically renamed. Output is UTF-8 without
//! BOM, LF-terminated, with no trailing comma. Each report also gets an
//! XLSX twin.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod annexure;
pub mod error;
pub mod reports;
pub mod writer;

// Re-exports
pub use annexure::{AnnexureFlag, AnnexureOutputs, AnnexureRecord};
pub use error::{Error, Result};
pub use reports::ReportEmitter;
