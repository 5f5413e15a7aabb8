//! Arena-backed working tables with sticky processed flags
//!
//! Rows live in an insertion-ordered arena; classification state lives in
//! parallel vectors indexed by row. Once a row's `processed` flag is set,
//! later steps skip it, which is what makes the step ordering meaningful.

use recon_core::types::{ExceptionType, MatchStatus, Source, TccType, TtumType, Txn};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Row-level classification assigned by an engine step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// Default: nothing has claimed the row
    Unmatched,
    /// The row was consumed by a matching step
    Matched,
    /// The row is awaiting resolution in a later cycle
    Hanging,
}

/// The full mark an engine step stamps onto a row
#[derive(Debug, Clone, Copy)]
pub struct Marking {
    /// Row-level status
    pub status: RowStatus,
    /// Exception tag, when the step assigns one
    pub exception: Option<ExceptionType>,
    /// True when the row needs a corrective TTUM
    pub ttum_required: bool,
    /// Corrective action kind
    pub ttum_type: Option<TtumType>,
    /// TCC raised by the step
    pub tcc_type: Option<TccType>,
}

impl Marking {
    /// Plain three-way match
    pub fn matched() -> Self {
        Self {
            status: RowStatus::Matched,
            exception: None,
            ttum_required: false,
            ttum_type: None,
            tcc_type: None,
        }
    }

    /// Match carrying an exception tag
    pub fn matched_with(exception: ExceptionType) -> Self {
        Self {
            exception: Some(exception),
            ..Self::matched()
        }
    }

    /// Unmatched disposition, optionally tagged
    pub fn unmatched(exception: Option<ExceptionType>) -> Self {
        Self {
            status: RowStatus::Unmatched,
            exception,
            ttum_required: false,
            ttum_type: None,
            tcc_type: None,
        }
    }

    /// Hanging disposition
    pub fn hanging(exception: ExceptionType) -> Self {
        Self {
            status: RowStatus::Hanging,
            exception: Some(exception),
            ttum_required: false,
            ttum_type: None,
            tcc_type: None,
        }
    }

    /// Attach a TTUM requirement
    pub fn with_ttum(mut self, ttum_type: TtumType) -> Self {
        self.ttum_required = true;
        self.ttum_type = Some(ttum_type);
        self
    }

    /// Attach a TCC
    pub fn with_tcc(mut self, tcc_type: TccType) -> Self {
        self.tcc_type = Some(tcc_type);
        self
    }
}

/// One source's working table for a cycle
#[derive(Debug)]
pub struct SourceTable {
    source: Source,
    txns: Vec<Txn>,
    processed: Vec<bool>,
    status: Vec<RowStatus>,
    exception: Vec<Option<ExceptionType>>,
    override_status: Vec<Option<MatchStatus>>,
    ttum_required: Vec<bool>,
    ttum_type: Vec<Option<TtumType>>,
    tcc_type: Vec<Option<TccType>>,
    rrn_index: HashMap<String, Vec<usize>>,
}

impl SourceTable {
    /// Build a table from normalized transactions, preserving input order
    pub fn from_txns(source: Source, txns: Vec<Txn>) -> Self {
        let len = txns.len();
        let mut rrn_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, txn) in txns.iter().enumerate() {
            if let Some(rrn) = txn.rrn.as_deref().filter(|r| !r.is_empty()) {
                rrn_index.entry(rrn.to_string()).or_default().push(idx);
            }
        }
        Self {
            source,
            txns,
            processed: vec![false; len],
            status: vec![RowStatus::Unmatched; len],
            exception: vec![None; len],
            override_status: vec![None; len],
            ttum_required: vec![false; len],
            ttum_type: vec![None; len],
            tcc_type: vec![None; len],
            rrn_index,
        }
    }

    /// Which source this table holds
    pub fn source(&self) -> Source {
        self.source
    }

    /// Row count
    pub fn len(&self) -> usize {
        self.txns.len()
    }

    /// True when the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    /// Transaction at a row index
    pub fn txn(&self, idx: usize) -> &Txn {
        &self.txns[idx]
    }

    /// Sticky processed flag
    pub fn is_processed(&self, idx: usize) -> bool {
        self.processed[idx]
    }

    /// Row-level status
    pub fn row_status(&self, idx: usize) -> RowStatus {
        self.status[idx]
    }

    /// Exception tag on a row
    pub fn exception(&self, idx: usize) -> Option<ExceptionType> {
        self.exception[idx]
    }

    /// Status override stamped by an adjustment
    pub fn override_status(&self, idx: usize) -> Option<MatchStatus> {
        self.override_status[idx]
    }

    /// TTUM requirement on a row
    pub fn ttum_required(&self, idx: usize) -> bool {
        self.ttum_required[idx]
    }

    /// TTUM kind on a row
    pub fn ttum_type(&self, idx: usize) -> Option<TtumType> {
        self.ttum_type[idx]
    }

    /// TCC on a row
    pub fn tcc_type(&self, idx: usize) -> Option<TccType> {
        self.tcc_type[idx]
    }

    /// Unprocessed row indices in insertion order
    pub fn unprocessed(&self) -> Vec<usize> {
        (0..self.txns.len()).filter(|&i| !self.processed[i]).collect()
    }

    /// All row indices for an RRN, in insertion order
    pub fn rows_for_rrn(&self, rrn: &str) -> &[usize] {
        self.rrn_index.get(rrn).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Unprocessed row indices for an RRN, in insertion order
    pub fn unprocessed_rows_for_rrn(&self, rrn: &str) -> Vec<usize> {
        self.rows_for_rrn(rrn)
            .iter()
            .copied()
            .filter(|&i| !self.processed[i])
            .collect()
    }

    /// True when any row carries this RRN
    pub fn has_rrn(&self, rrn: &str) -> bool {
        self.rrn_index.contains_key(rrn)
    }

    /// RRNs present in this table
    pub fn rrns(&self) -> impl Iterator<Item = &str> {
        self.rrn_index.keys().map(|k| k.as_str())
    }

    /// Stamp a mark onto a row and set its processed flag.
    ///
    /// Sticky: an already-processed row is left untouched and `false` is
    /// returned.
    pub fn mark(&mut self, idx: usize, marking: &Marking) -> bool {
        if self.processed[idx] {
            return false;
        }
        self.processed[idx] = true;
        self.status[idx] = marking.status;
        if marking.exception.is_some() {
            self.exception[idx] = marking.exception;
        }
        if marking.ttum_required {
            self.ttum_required[idx] = true;
        }
        if marking.ttum_type.is_some() {
            self.ttum_type[idx] = marking.ttum_type;
        }
        if marking.tcc_type.is_some() {
            self.tcc_type[idx] = marking.tcc_type;
        }
        true
    }

    /// Stamp a record-level status override (adjustment STATUS_OVERRIDE)
    pub fn mark_override(&mut self, idx: usize, status: MatchStatus, exception: ExceptionType) -> bool {
        if self.processed[idx] {
            return false;
        }
        self.processed[idx] = true;
        self.override_status[idx] = Some(status);
        self.exception[idx] = Some(exception);
        true
    }

    /// Tag an exception without consuming the row (amount corrections)
    pub fn tag_exception(&mut self, idx: usize, exception: ExceptionType) {
        self.exception[idx] = Some(exception);
    }

    /// Overwrite a row's amount (adjustment AMOUNT_CORRECTION)
    pub fn set_amount(&mut self, idx: usize, amount: Decimal) {
        self.txns[idx].amount = amount;
    }
}
