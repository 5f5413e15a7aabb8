//! Voucher and general-ledger types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Types of accounting vouchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoucherType {
    /// Customer payment for a matched transaction
    Payment,
    /// Transaction reversal
    Reversal,
    /// Manual adjustment
    Adjustment,
    /// Settlement entry for an unmatched transaction
    Settlement,
}

/// Status of voucher processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    /// Voucher created, not yet posted
    Generated,
    /// Posted to the general ledger
    Posted,
    /// Posting failed
    Failed,
    /// Voucher reversed
    Reversed,
    /// Reset by an accounting rollback, awaiting regeneration
    #[serde(rename = "matched/pending")]
    MatchedPending,
}

/// One general-ledger leg of a voucher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlEntry {
    /// Entry identifier
    pub entry_id: String,

    /// Ledger account code
    pub account_code: String,

    /// Ledger account name
    pub account_name: String,

    /// Debit amount; zero for credit legs
    pub debit_amount: Decimal,

    /// Credit amount; zero for debit legs
    pub credit_amount: Decimal,

    /// Narration
    pub description: String,

    /// Reference back to the transaction
    pub reference: String,

    /// When the entry was created
    pub timestamp: DateTime<Utc>,
}

impl GlEntry {
    /// Debit leg against an account
    pub fn debit(
        entry_id: String,
        code: &str,
        name: &str,
        amount: Decimal,
        description: String,
        reference: String,
    ) -> Self {
        Self {
            entry_id,
            account_code: code.to_string(),
            account_name: name.to_string(),
            debit_amount: amount,
            credit_amount: Decimal::ZERO,
            description,
            reference,
            timestamp: Utc::now(),
        }
    }

    /// Credit leg against an account
    pub fn credit(
        entry_id: String,
        code: &str,
        name: &str,
        amount: Decimal,
        description: String,
        reference: String,
    ) -> Self {
        Self {
            entry_id,
            account_code: code.to_string(),
            account_name: name.to_string(),
            debit_amount: Decimal::ZERO,
            credit_amount: amount,
            description,
            reference,
            timestamp: Utc::now(),
        }
    }
}

/// Note recorded on a voucher by an accounting rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherRollback {
    /// Rollback operation identifier
    pub rollback_id: String,

    /// When the rollback ran
    pub rollback_timestamp: DateTime<Utc>,

    /// Operator-supplied reason
    pub rollback_reason: String,

    /// Status before the rollback
    pub previous_status: VoucherStatus,

    /// GL entries cleared by the rollback
    pub previous_gl_entries: Vec<GlEntry>,
}

/// An accounting voucher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    /// Voucher identifier
    pub voucher_id: String,

    /// Voucher type
    pub voucher_type: VoucherType,

    /// Underlying transaction date
    pub transaction_date: Option<NaiveDate>,

    /// Voucher amount
    pub amount: Decimal,

    /// Narration
    pub description: String,

    /// Processing status
    pub status: VoucherStatus,

    /// When the voucher was created
    pub created_at: DateTime<Utc>,

    /// When the voucher was posted, once posted
    pub posted_at: Option<DateTime<Utc>>,

    /// Link to the originating transaction
    pub rrn: Option<String>,

    /// Double-entry legs
    pub gl_entries: Vec<GlEntry>,

    /// Set by an accounting rollback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_metadata: Option<VoucherRollback>,
}

impl Voucher {
    /// Total of the debit legs
    pub fn total_debit(&self) -> Decimal {
        self.gl_entries.iter().map(|e| e.debit_amount).sum()
    }

    /// Total of the credit legs
    pub fn total_credit(&self) -> Decimal {
        self.gl_entries.iter().map(|e| e.credit_amount).sum()
    }

    /// Double-entry balance check within the given tolerance
    pub fn is_balanced(&self, epsilon: Decimal) -> bool {
        (self.total_debit() - self.total_credit()).abs() < epsilon
    }
}

/// Accounting summary for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountingSummary {
    /// Vouchers generated
    pub total_vouchers: usize,

    /// Matched transactions covered by payment vouchers
    pub matched_transactions: usize,

    /// Partial/orphan transactions covered by settlement vouchers
    pub settlement_transactions: usize,

    /// Vouchers rejected for failing the balance check
    pub rejected_vouchers: usize,

    /// Sum of voucher amounts
    pub total_amount: Decimal,
}

/// Note recorded at the output level by an accounting rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingStatusNote {
    /// Outcome label
    pub status: String,

    /// How many vouchers were reset
    pub vouchers_reset: usize,

    /// Operator-supplied reason
    pub rollback_reason: String,

    /// Rollback operation identifier
    pub rollback_id: String,

    /// When the rollback ran
    pub timestamp: DateTime<Utc>,
}

/// Persisted accounting output for a run (`accounting_output.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingOutput {
    /// Run identifier
    pub run_id: String,

    /// When the vouchers were generated
    pub generated_at: DateTime<Utc>,

    /// Aggregate counters
    pub summary: AccountingSummary,

    /// All vouchers for the run
    pub vouchers: Vec<Voucher>,

    /// Set once an accounting rollback has touched this output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounting_status: Option<AccountingStatusNote>,
}
