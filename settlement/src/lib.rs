//! Settlement Accounting Engine
//!
//! Turns a finalised reconciliation result into balanced double-entry
//! vouchers, a posted general ledger, and the TTUM instruction files the
//! clearing network consumes.
//!
//! # Flow
//!
//! 1. **Voucher generation**: one PAYMENT voucher per matched record,
//!    one SETTLEMENT voucher per partial/orphan record
//! 2. **Validation**: every voucher balances within 0.01 or is rejected
//! 3. **Posting**: a separate pass flips GENERATED vouchers to POSTED
//! 4. **Emission**: `accounting_output.json`, the GL statement CSV, and
//!    one TTUM CSV/XLSX pair per adjustment category
//!
//! # Invariants
//!
//! - Σ(debits) = Σ(credits) within 0.01 for every voucher
//! - Vouchers exist only for records that are not currently rolled back

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod accounts;
pub mod engine;
pub mod error;
pub mod ttum;
pub mod types;

// Re-exports
pub use accounts::{IssuerAction, IssuerActions, TtumCategory};
pub use engine::SettlementEngine;
pub use error::{Error, Result};
pub use types::{AccountingOutput, GlEntry, Voucher, VoucherStatus, VoucherType};
