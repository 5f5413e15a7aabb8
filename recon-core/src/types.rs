//! Canonical types for the reconciliation rail
//!
//! All types are designed for:
//! - Deterministic serialization (BTreeMap keyed records)
//! - Exact arithmetic (Decimal for money)
//! - Closed tagged variants instead of status strings

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source system that produced a transaction view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    /// Core Banking System (the bank's book of record)
    Cbs,
    /// The bank's payment switch
    Switch,
    /// The national UPI clearing network
    Npci,
    /// Net-settlement file produced by the network
    Ntsl,
    /// Manual adjustment file
    Adjustment,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Cbs => "CBS",
            Source::Switch => "SWITCH",
            Source::Npci => "NPCI",
            Source::Ntsl => "NTSL",
            Source::Adjustment => "ADJUSTMENT",
        };
        write!(f, "{}", s)
    }
}

/// Debit/credit indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DrCr {
    /// Money leaving the account
    Debit,
    /// Money entering the account
    Credit,
    /// Indicator absent or unrecognized
    Unspecified,
}

impl DrCr {
    /// True for a debit leg
    pub fn is_debit(&self) -> bool {
        matches!(self, DrCr::Debit)
    }

    /// True for a credit leg
    pub fn is_credit(&self) -> bool {
        matches!(self, DrCr::Credit)
    }

    /// True when this and `other` form a debit/credit pair
    pub fn is_opposite(&self, other: DrCr) -> bool {
        matches!(
            (self, other),
            (DrCr::Debit, DrCr::Credit) | (DrCr::Credit, DrCr::Debit)
        )
    }
}

/// Network response code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseCode {
    /// Explicit success ("00")
    Success,
    /// Deemed success ("RB"): network considers the transaction accepted
    Deemed,
    /// Decline with the raw network code
    Fail(String),
    /// No response code present
    Unspecified,
}

impl ResponseCode {
    /// Parse a raw response-code cell
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ResponseCode::Unspecified;
        }
        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("RB") {
            ResponseCode::Deemed
        } else if matches!(upper.as_str(), "00" | "0" | "SUCCESS" | "S") {
            ResponseCode::Success
        } else {
            ResponseCode::Fail(trimmed.to_string())
        }
    }

    /// Wire representation ("00", "RB", the decline code, or empty)
    pub fn code(&self) -> String {
        match self {
            ResponseCode::Success => "00".to_string(),
            ResponseCode::Deemed => "RB".to_string(),
            ResponseCode::Fail(code) => code.clone(),
            ResponseCode::Unspecified => String::new(),
        }
    }

    /// True for an explicit decline
    pub fn is_fail(&self) -> bool {
        matches!(self, ResponseCode::Fail(_))
    }
}

impl From<String> for ResponseCode {
    fn from(raw: String) -> Self {
        ResponseCode::parse(&raw)
    }
}

impl From<ResponseCode> for String {
    fn from(rc: ResponseCode) -> Self {
        rc.code()
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Network transaction type (e.g. U2/P2P)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranType {
    /// Network type code (U2, U3, ...)
    pub network: Option<String>,
    /// Subtype (P2P, P2M)
    pub subtype: Option<String>,
}

impl TranType {
    /// Raw text joined for keyword checks
    pub fn text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(n) = &self.network {
            parts.push(n.as_str());
        }
        if let Some(s) = &self.subtype {
            parts.push(s.as_str());
        }
        parts.join(" ")
    }
}

/// Transaction direction relative to the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Credit-dominant: money coming in
    Inward,
    /// Debit-dominant: money going out
    Outward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inward => write!(f, "INWARD"),
            Direction::Outward => write!(f, "OUTWARD"),
        }
    }
}

/// Terminal classification of a reconciliation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Three-way agreement
    Matched,
    /// Exactly two sources agree
    PartialMatch,
    /// All sources present but disagreeing
    Mismatch,
    /// Two sources present and disagreeing
    PartialMismatch,
    /// Confirmed by the bank, unseen by the network
    Hanging,
    /// Present in a single source only
    Orphan,
    /// Multiple same-sign entries for one RRN
    Duplicate,
    /// Carries a corrective-action disposition
    Exception,
    /// Matched by operator adjustment
    ForceMatched,
    /// No classification could be derived
    Unknown,
}

impl MatchStatus {
    /// Parse a status-override value from an adjustment file
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MATCHED" => Some(MatchStatus::Matched),
            "PARTIAL_MATCH" => Some(MatchStatus::PartialMatch),
            "MISMATCH" => Some(MatchStatus::Mismatch),
            "PARTIAL_MISMATCH" => Some(MatchStatus::PartialMismatch),
            "HANGING" => Some(MatchStatus::Hanging),
            "ORPHAN" => Some(MatchStatus::Orphan),
            "DUPLICATE" => Some(MatchStatus::Duplicate),
            "EXCEPTION" => Some(MatchStatus::Exception),
            "FORCE_MATCHED" => Some(MatchStatus::ForceMatched),
            "UNKNOWN" => Some(MatchStatus::Unknown),
            _ => None,
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "MATCHED",
            MatchStatus::PartialMatch => "PARTIAL_MATCH",
            MatchStatus::Mismatch => "MISMATCH",
            MatchStatus::PartialMismatch => "PARTIAL_MISMATCH",
            MatchStatus::Hanging => "HANGING",
            MatchStatus::Orphan => "ORPHAN",
            MatchStatus::Duplicate => "DUPLICATE",
            MatchStatus::Exception => "EXCEPTION",
            MatchStatus::ForceMatched => "FORCE_MATCHED",
            MatchStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exception tag assigned by the matching engine or the decision matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionType {
    /// Bank-internal auto-reversal absorbed within one source
    SelfMatched,
    /// Original leg in this cycle, reversal expected in the next
    CutOff,
    /// Present in Switch, absent from NPCI
    SwitchOnly,
    /// Settlement lump entry in the GL
    SettlementEntry,
    /// Multiple postings for one RRN
    DoubleDebitCredit,
    /// Deemed success acknowledged (credit confirmed)
    #[serde(rename = "TCC_102")]
    Tcc102,
    /// Deemed success without bank credit (credit requested)
    #[serde(rename = "TCC_103")]
    Tcc103,
    /// NPCI declined the transaction
    NpciDeclined,
    /// Bank posted against an NPCI decline
    NpciFailed,
    /// Network reversal pair without matching bank reversal
    FailedAutoReversal,
    /// Carry-over aged out and triggered an automatic TTUM
    CarryOverTtum,
    /// Operator force-match adjustment
    AdjustmentForceMatch,
    /// Operator amount-correction adjustment
    AdjustmentAmountCorrection,
    /// Operator status-override adjustment
    AdjustmentStatusOverride,
    /// Outward failure: refund the remitter
    RemitterRefund,
    /// Outward recovery from the remitter
    RemitterRecovery,
    /// Inward recovery from the beneficiary
    BeneficiaryRecovery,
    /// Beneficiary credit owed, raised as TCC 103
    #[serde(rename = "BENEFICIARY_CREDIT_TCC_103")]
    BeneficiaryCreditTcc103,
    /// Switch record needs an external update
    SwitchUpdate,
    /// Switch update combined with a TCC
    SwitchUpdateTcc,
    /// No rule in the decision matrix covered the tuple
    UnmatchedNoRule,
}

impl ExceptionType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionType::SelfMatched => "SELF_MATCHED",
            ExceptionType::CutOff => "CUT_OFF",
            ExceptionType::SwitchOnly => "SWITCH_ONLY",
            ExceptionType::SettlementEntry => "SETTLEMENT_ENTRY",
            ExceptionType::DoubleDebitCredit => "DOUBLE_DEBIT_CREDIT",
            ExceptionType::Tcc102 => "TCC_102",
            ExceptionType::Tcc103 => "TCC_103",
            ExceptionType::NpciDeclined => "NPCI_DECLINED",
            ExceptionType::NpciFailed => "NPCI_FAILED",
            ExceptionType::FailedAutoReversal => "FAILED_AUTO_REVERSAL",
            ExceptionType::CarryOverTtum => "CARRY_OVER_TTUM",
            ExceptionType::AdjustmentForceMatch => "ADJUSTMENT_FORCE_MATCH",
            ExceptionType::AdjustmentAmountCorrection => "ADJUSTMENT_AMOUNT_CORRECTION",
            ExceptionType::AdjustmentStatusOverride => "ADJUSTMENT_STATUS_OVERRIDE",
            ExceptionType::RemitterRefund => "REMITTER_REFUND",
            ExceptionType::RemitterRecovery => "REMITTER_RECOVERY",
            ExceptionType::BeneficiaryRecovery => "BENEFICIARY_RECOVERY",
            ExceptionType::BeneficiaryCreditTcc103 => "BENEFICIARY_CREDIT_TCC_103",
            ExceptionType::SwitchUpdate => "SWITCH_UPDATE",
            ExceptionType::SwitchUpdateTcc => "SWITCH_UPDATE_TCC",
            ExceptionType::UnmatchedNoRule => "UNMATCHED_NO_RULE",
        }
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Corrective action carried by a TTUM instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TtumType {
    /// Reverse the remitter debit
    Reversal,
    /// Recover funds from the remitter
    Recovery,
    /// Credit the beneficiary
    BeneficiaryCredit,
    /// Same-sign duplicate; manual investigation
    Investigation,
}

impl fmt::Display for TtumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TtumType::Reversal => "REVERSAL",
            TtumType::Recovery => "RECOVERY",
            TtumType::BeneficiaryCredit => "BENEFICIARY_CREDIT",
            TtumType::Investigation => "INVESTIGATION",
        };
        write!(f, "{}", s)
    }
}

/// Transaction Credit Confirmation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TccType {
    /// Acknowledgement of credit
    #[serde(rename = "TCC_102")]
    Tcc102,
    /// Request for credit
    #[serde(rename = "TCC_103")]
    Tcc103,
}

impl fmt::Display for TccType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TccType::Tcc102 => write!(f, "TCC_102"),
            TccType::Tcc103 => write!(f, "TCC_103"),
        }
    }
}

/// Canonical transaction record as seen by one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Txn {
    /// UPI transaction identifier, globally unique
    pub upi_tran_id: Option<String>,

    /// 12-digit retrieval reference number
    pub rrn: Option<String>,

    /// Transaction amount, two fractional digits
    pub amount: Decimal,

    /// Transaction date
    pub tran_date: NaiveDate,

    /// Wall-clock time, when the source provides one
    pub tran_time: Option<NaiveTime>,

    /// Debit/credit indicator
    pub dr_cr: DrCr,

    /// Network response code
    pub rc: ResponseCode,

    /// Network transaction type
    #[serde(default)]
    pub tran_type: TranType,

    /// Payer PSP code
    pub payer_psp: Option<String>,

    /// Payee PSP code
    pub payee_psp: Option<String>,

    /// Merchant category code
    pub mcc: Option<String>,

    /// Originating channel
    pub channel: Option<String>,

    /// Source system that produced this view
    pub source: Source,
}

impl Txn {
    /// Reconciliation key: RRN when present, else the UPI transaction ID
    pub fn key(&self) -> Option<&str> {
        self.rrn
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| self.upi_tran_id.as_deref().filter(|t| !t.is_empty()))
    }
}

/// Prior-state snapshot recorded by a rollback operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    /// Rollback operation that produced this snapshot
    pub rollback_id: String,

    /// Status before the rollback
    pub previous_status: MatchStatus,

    /// Cycle the record belonged to, if scoped
    pub cycle_id: Option<String>,

    /// When the rollback ran
    pub rollback_timestamp: DateTime<Utc>,

    /// Operator-supplied reason
    pub rollback_reason: String,
}

/// Reconciliation record for one RRN across all sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconRecord {
    /// CBS view, when present
    pub cbs: Option<Txn>,

    /// Switch view, when present
    pub switch: Option<Txn>,

    /// NPCI view, when present
    pub npci: Option<Txn>,

    /// Terminal classification
    pub status: MatchStatus,

    /// Exception tag, when the classifier assigned one
    pub exception_type: Option<ExceptionType>,

    /// True when a corrective TTUM must be generated
    pub ttum_required: bool,

    /// Corrective action kind
    pub ttum_type: Option<TtumType>,

    /// TCC raised for this record
    pub tcc_type: Option<TccType>,

    /// Direction relative to the bank
    pub direction: Direction,

    /// Settlement cycle this record was classified in
    pub cycle_id: Option<String>,

    /// Ordered prior-state snapshots from rollbacks
    #[serde(default)]
    pub rollback_metadata: Vec<RollbackSnapshot>,
}

impl ReconRecord {
    /// View for a given source slot
    pub fn source(&self, source: Source) -> Option<&Txn> {
        match source {
            Source::Cbs => self.cbs.as_ref(),
            Source::Switch => self.switch.as_ref(),
            Source::Npci => self.npci.as_ref(),
            _ => None,
        }
    }

    /// First populated view, preferring CBS, then Switch, then NPCI
    pub fn primary(&self) -> Option<&Txn> {
        self.cbs
            .as_ref()
            .or(self.switch.as_ref())
            .or(self.npci.as_ref())
    }

    /// Number of populated source slots
    pub fn populated_sources(&self) -> usize {
        [&self.cbs, &self.switch, &self.npci]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}

/// Note left in the run summary by the most recent rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackNote {
    /// Rollback operation identifier
    pub rollback_id: String,

    /// Rollback level that ran
    pub level: String,

    /// How many records were restored
    pub transactions_restored: usize,

    /// When the rollback ran
    pub timestamp: DateTime<Utc>,

    /// Operator-supplied reason
    pub reason: String,
}

/// Aggregate counters for a reconciliation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconSummary {
    /// Total CBS rows seen
    pub total_cbs: usize,
    /// Total Switch rows seen
    pub total_switch: usize,
    /// Total NPCI rows seen
    pub total_npci: usize,
    /// CBS rows that reached MATCHED
    pub matched_cbs: usize,
    /// Switch rows that reached MATCHED
    pub matched_switch: usize,
    /// NPCI rows that reached MATCHED
    pub matched_npci: usize,
    /// CBS rows left unmatched
    pub unmatched_cbs: usize,
    /// Switch rows left unmatched
    pub unmatched_switch: usize,
    /// NPCI rows left unmatched
    pub unmatched_npci: usize,
    /// Rows classified HANGING
    pub hanging: usize,
    /// Records requiring a TTUM
    pub ttum_required: usize,
    /// Credit-leg count across all sources
    pub inflow_count: usize,
    /// Credit-leg amount across all sources
    pub inflow_amount: Decimal,
    /// Debit-leg count across all sources
    pub outflow_count: usize,
    /// Debit-leg amount across all sources
    pub outflow_amount: Decimal,
    /// Most recent rollback touching this run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rollback: Option<RollbackNote>,
}

/// Final reconciliation result for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconOutput {
    /// Run identifier
    pub run_id: String,

    /// When the engine produced this output
    pub generated_at: DateTime<Utc>,

    /// Cycle this output covers, when cycle-scoped
    pub cycle_id: Option<String>,

    /// Aggregate counters
    pub summary: ReconSummary,

    /// Records keyed by RRN (or UPI transaction ID when RRN is missing)
    pub records: BTreeMap<String, ReconRecord>,
}

/// One hanging transaction carried across cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarryOverEntry {
    /// Retrieval reference number
    pub rrn: String,

    /// Amount of the hanging leg
    pub amount: Decimal,

    /// Debit/credit indicator of the hanging leg
    pub dr_cr: DrCr,

    /// Why the transaction went hanging
    pub reason: String,

    /// Cycle the transaction was first seen hanging in
    pub first_seen_cycle: Option<String>,

    /// Most recent cycle that carried the entry
    pub last_cycle_id: Option<String>,

    /// Number of cycles the entry has persisted
    pub cycles_persisted: u32,
}

/// Persisted carry-over state for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarryOverState {
    /// Entries still awaiting resolution
    pub entries: Vec<CarryOverEntry>,

    /// Cycle that last updated this state
    pub last_cycle_id: Option<String>,

    /// When the state was last written
    pub updated_at: DateTime<Utc>,
}

impl Default for CarryOverState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            last_cycle_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// Amount equality under the configured epsilon
pub fn amounts_match(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    (a - b).abs() < epsilon
}

/// Date equality within the configured day tolerance
pub fn dates_match(a: NaiveDate, b: NaiveDate, tolerance_days: i64) -> bool {
    (a - b).num_days().abs() <= tolerance_days
}

/// RRN format check: exactly 12 ASCII digits
pub fn rrn_is_well_formed(rrn: &str) -> bool {
    rrn.len() == 12 && rrn.bytes().all(|b| b.is_ascii_digit())
}
