//! Voucher generation and GL posting
//!
//! Matched records produce PAYMENT vouchers (debit Bank, credit
//! Settlement Receivable); partial and orphan records produce SETTLEMENT
//! vouchers (debit Suspense, credit Settlement Payable). Posting is a
//! separate pass so a rollback can reset generated vouchers before any
//! GL mutation happens.

use crate::accounts::IssuerActions;
use crate::error::Result;
use crate::types::{
    AccountingOutput, AccountingSummary, GlEntry, Voucher, VoucherStatus, VoucherType,
};
use chrono::Utc;
use recon_core::config::GlAccounts;
use recon_core::store::{atomic_write_json, RunPaths};
use recon_core::types::{MatchStatus, ReconOutput, ReconRecord};
use recon_core::Config;
use reporting::writer::write_csv_atomic;
use rust_decimal::Decimal;
use std::path::PathBuf;

const GL_STATEMENT_HEADERS: [&str; 6] = [
    "Voucher_ID",
    "RRN",
    "Voucher_Type",
    "Amount",
    "Status",
    "Created_At",
];

/// Outcome of a posting pass
#[derive(Debug, Clone, Default)]
pub struct PostingResult {
    /// Vouchers flipped to POSTED
    pub posted: usize,
    /// Vouchers flipped to FAILED
    pub failed: usize,
    /// Vouchers considered
    pub attempted: usize,
}

/// Engine for generating vouchers and GL entries from reconciled records
pub struct SettlementEngine {
    gl_accounts: GlAccounts,
    issuer_actions: IssuerActions,
    epsilon: Decimal,
    voucher_counter: u32,
    entry_counter: u64,
    vouchers: Vec<Voucher>,
}

impl SettlementEngine {
    /// Build an engine from configuration and the issuer action map
    pub fn new(config: &Config, issuer_actions: IssuerActions) -> Self {
        Self {
            gl_accounts: config.gl_accounts.clone(),
            issuer_actions,
            epsilon: config.amount_epsilon,
            voucher_counter: 1,
            entry_counter: 1,
            vouchers: Vec::new(),
        }
    }

    /// GL account map in use
    pub fn gl_accounts(&self) -> &GlAccounts {
        &self.gl_accounts
    }

    /// Issuer action map in use
    pub fn issuer_actions(&self) -> &IssuerActions {
        &self.issuer_actions
    }

    /// Vouchers generated so far
    pub fn vouchers(&self) -> &[Voucher] {
        &self.vouchers
    }

    fn next_entry_id(&mut self) -> String {
        let id = format!("GL_{:08}", self.entry_counter);
        self.entry_counter += 1;
        id
    }

    /// Generate vouchers for every eligible record in a run.
    ///
    /// Records currently in a rolled-back state (orphaned with rollback
    /// snapshots attached) are skipped until a re-run reclassifies them.
    pub fn generate_vouchers(&mut self, output: &ReconOutput) -> AccountingOutput {
        tracing::info!("generating vouchers for run {}", output.run_id);

        let mut summary = AccountingSummary::default();

        for (key, record) in &output.records {
            let rolled_back =
                record.status == MatchStatus::Orphan && !record.rollback_metadata.is_empty();
            if rolled_back {
                tracing::debug!("skipping rolled-back record {}", key);
                continue;
            }

            let voucher = match record.status {
                MatchStatus::Matched => self.create_payment_voucher(key, record),
                MatchStatus::PartialMatch | MatchStatus::Orphan => {
                    self.create_settlement_voucher(key, record)
                }
                _ => None,
            };

            let Some(voucher) = voucher else {
                continue;
            };

            if !voucher.is_balanced(self.epsilon) {
                tracing::warn!(
                    "rejecting unbalanced voucher {} (debit {} credit {})",
                    voucher.voucher_id,
                    voucher.total_debit(),
                    voucher.total_credit()
                );
                summary.rejected_vouchers += 1;
                continue;
            }

            match voucher.voucher_type {
                VoucherType::Payment => summary.matched_transactions += 1,
                _ => summary.settlement_transactions += 1,
            }
            summary.total_amount += voucher.amount;
            self.vouchers.push(voucher);
        }

        summary.total_vouchers = self.vouchers.len();
        tracing::info!(
            "generated {} vouchers totaling {}",
            summary.total_vouchers,
            summary.total_amount
        );

        AccountingOutput {
            run_id: output.run_id.clone(),
            generated_at: Utc::now(),
            summary,
            vouchers: self.vouchers.clone(),
            accounting_status: None,
        }
    }

    /// Payment voucher: debit Bank, credit Settlement Receivable
    fn create_payment_voucher(&mut self, key: &str, record: &ReconRecord) -> Option<Voucher> {
        let txn = record.primary()?;
        if txn.amount <= Decimal::ZERO {
            return None;
        }
        let amount = txn.amount;

        let voucher_id = format!("VOUCHER_{:06}", self.voucher_counter);
        self.voucher_counter += 1;

        let reference = format!("RRN:{}", key);
        let gl_entries = vec![
            GlEntry::debit(
                self.next_entry_id(),
                &self.gl_accounts.bank_account.code,
                &self.gl_accounts.bank_account.name,
                amount,
                format!("Payment received - RRN {}", key),
                reference.clone(),
            ),
            GlEntry::credit(
                self.next_entry_id(),
                &self.gl_accounts.settlement_receivable.code,
                &self.gl_accounts.settlement_receivable.name,
                amount,
                format!("Settlement receivable - RRN {}", key),
                reference,
            ),
        ];

        Some(Voucher {
            voucher_id,
            voucher_type: VoucherType::Payment,
            transaction_date: Some(txn.tran_date),
            amount,
            description: format!("Payment voucher for matched transaction RRN {}", key),
            status: VoucherStatus::Generated,
            created_at: Utc::now(),
            posted_at: None,
            rrn: Some(key.to_string()),
            gl_entries,
            rollback_metadata: None,
        })
    }

    /// Settlement voucher: debit Suspense, credit Settlement Payable
    fn create_settlement_voucher(&mut self, key: &str, record: &ReconRecord) -> Option<Voucher> {
        let txn = record.primary()?;
        if txn.amount <= Decimal::ZERO {
            return None;
        }
        let amount = txn.amount;
        let source = txn.source;

        let voucher_id = format!("SETTLE_{:06}", self.voucher_counter);
        self.voucher_counter += 1;

        let reference = format!("RRN:{}", key);
        let gl_entries = vec![
            GlEntry::debit(
                self.next_entry_id(),
                &self.gl_accounts.suspense_account.code,
                &self.gl_accounts.suspense_account.name,
                amount,
                format!("Unmatched transaction - RRN {} ({})", key, source),
                reference.clone(),
            ),
            GlEntry::credit(
                self.next_entry_id(),
                &self.gl_accounts.settlement_payable.code,
                &self.gl_accounts.settlement_payable.name,
                amount,
                format!("Settlement payable - RRN {}", key),
                reference,
            ),
        ];

        Some(Voucher {
            voucher_id,
            voucher_type: VoucherType::Settlement,
            transaction_date: Some(txn.tran_date),
            amount,
            description: format!(
                "Settlement voucher for unmatched transaction RRN {} ({})",
                key, source
            ),
            status: VoucherStatus::Generated,
            created_at: Utc::now(),
            posted_at: None,
            rrn: Some(key.to_string()),
            gl_entries,
            rollback_metadata: None,
        })
    }

    /// Post generated vouchers to the GL.
    ///
    /// Walks the targeted vouchers, re-validates the balance, and flips
    /// GENERATED to POSTED; failures flip to FAILED instead of aborting
    /// the pass.
    pub fn post_vouchers(&mut self, voucher_ids: Option<&[String]>) -> PostingResult {
        let mut result = PostingResult::default();
        let epsilon = self.epsilon;

        for voucher in self.vouchers.iter_mut() {
            let targeted = match voucher_ids {
                Some(ids) => ids.iter().any(|id| *id == voucher.voucher_id),
                None => voucher.status == VoucherStatus::Generated,
            };
            if !targeted {
                continue;
            }
            result.attempted += 1;

            if voucher.is_balanced(epsilon) {
                voucher.status = VoucherStatus::Posted;
                voucher.posted_at = Some(Utc::now());
                result.posted += 1;
                tracing::info!("posted voucher {} to GL", voucher.voucher_id);
            } else {
                voucher.status = VoucherStatus::Failed;
                result.failed += 1;
                tracing::error!(
                    "failed to post voucher {}: unbalanced entries",
                    voucher.voucher_id
                );
            }
        }

        result
    }

    /// Persist `accounting_output.json` atomically
    pub fn save(&self, output: &AccountingOutput, paths: &RunPaths) -> Result<()> {
        let mut refreshed = output.clone();
        refreshed.vouchers = self.vouchers.clone();
        atomic_write_json(&paths.accounting_output(), &refreshed)?;
        Ok(())
    }

    /// Emit the concatenated GL statement CSV
    pub fn generate_gl_statement(&self, paths: &RunPaths) -> Result<PathBuf> {
        let rows: Vec<Vec<String>> = self
            .vouchers
            .iter()
            .map(|v| {
                vec![
                    v.voucher_id.clone(),
                    v.rrn.clone().unwrap_or_default(),
                    format!("{:?}", v.voucher_type).to_ascii_uppercase(),
                    format!("{:.2}", v.amount),
                    serde_json::to_string(&v.status)
                        .unwrap_or_default()
                        .trim_matches('"')
                        .to_string(),
                    v.created_at.to_rfc3339(),
                ]
            })
            .collect();

        let dir = paths.gl_statement_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("gl_statement.csv");
        write_csv_atomic(&path, &GL_STATEMENT_HEADERS, &rows)?;
        tracing::info!("generated GL statement with {} vouchers", rows.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use recon_core::types::{
        Direction, DrCr, ReconSummary, ResponseCode, RollbackSnapshot, Source, TranType, Txn,
    };
    use std::collections::BTreeMap;

    fn txn(rrn: &str, amount: i64) -> Txn {
        Txn {
            upi_tran_id: None,
            rrn: Some(rrn.to_string()),
            amount: Decimal::new(amount, 2),
            tran_date: NaiveDate::from_ymd_opt(2026, 1, 4).unwrap(),
            tran_time: None,
            dr_cr: DrCr::Credit,
            rc: ResponseCode::Success,
            tran_type: TranType::default(),
            payer_psp: None,
            payee_psp: None,
            mcc: None,
            channel: None,
            source: Source::Cbs,
        }
    }

    fn record(rrn: &str, amount: i64, status: MatchStatus) -> ReconRecord {
        ReconRecord {
            cbs: Some(txn(rrn, amount)),
            switch: None,
            npci: None,
            status,
            exception_type: None,
            ttum_required: false,
            ttum_type: None,
            tcc_type: None,
            direction: Direction::Inward,
            cycle_id: Some("1C".to_string()),
            rollback_metadata: Vec::new(),
        }
    }

    fn output(records: BTreeMap<String, ReconRecord>) -> ReconOutput {
        ReconOutput {
            run_id: "RUN_S".to_string(),
            generated_at: Utc::now(),
            cycle_id: Some("1C".to_string()),
            summary: ReconSummary::default(),
            records,
        }
    }

    fn engine() -> SettlementEngine {
        SettlementEngine::new(&Config::default(), IssuerActions::default())
    }

    #[test]
    fn test_payment_voucher_for_matched_record() {
        let mut records = BTreeMap::new();
        records.insert(
            "100000000001".to_string(),
            record("100000000001", 15000, MatchStatus::Matched),
        );

        let mut engine = engine();
        let accounting = engine.generate_vouchers(&output(records));

        assert_eq!(accounting.summary.total_vouchers, 1);
        assert_eq!(accounting.summary.matched_transactions, 1);
        let voucher = &accounting.vouchers[0];
        assert_eq!(voucher.voucher_type, VoucherType::Payment);
        assert_eq!(voucher.amount, Decimal::new(15000, 2));
        assert_eq!(voucher.gl_entries.len(), 2);
        assert_eq!(voucher.gl_entries[0].account_code, "100200");
        assert_eq!(voucher.gl_entries[0].debit_amount, Decimal::new(15000, 2));
        assert_eq!(voucher.gl_entries[1].account_code, "100300");
        assert_eq!(voucher.gl_entries[1].credit_amount, Decimal::new(15000, 2));
        assert!(voucher.is_balanced(Decimal::new(1, 2)));
    }

    #[test]
    fn test_settlement_voucher_for_orphan() {
        let mut records = BTreeMap::new();
        records.insert(
            "200000000002".to_string(),
            record("200000000002", 9900, MatchStatus::Orphan),
        );

        let mut engine = engine();
        let accounting = engine.generate_vouchers(&output(records));

        assert_eq!(accounting.summary.settlement_transactions, 1);
        let voucher = &accounting.vouchers[0];
        assert_eq!(voucher.voucher_type, VoucherType::Settlement);
        assert!(voucher.voucher_id.starts_with("SETTLE_"));
        assert_eq!(voucher.gl_entries[0].account_code, "200100");
        assert_eq!(voucher.gl_entries[1].account_code, "200200");
    }

    #[test]
    fn test_rolled_back_record_gets_no_voucher() {
        let mut rolled = record("300000000003", 5000, MatchStatus::Orphan);
        rolled.rollback_metadata.push(RollbackSnapshot {
            rollback_id: "RB_MID_001_0104".to_string(),
            previous_status: MatchStatus::Matched,
            cycle_id: Some("1C".to_string()),
            rollback_timestamp: Utc::now(),
            rollback_reason: "engine crash".to_string(),
        });

        let mut records = BTreeMap::new();
        records.insert("300000000003".to_string(), rolled);

        let mut engine = engine();
        let accounting = engine.generate_vouchers(&output(records));
        assert_eq!(accounting.summary.total_vouchers, 0);
    }

    #[test]
    fn test_posting_flips_generated_to_posted() {
        let mut records = BTreeMap::new();
        records.insert(
            "100000000001".to_string(),
            record("100000000001", 15000, MatchStatus::Matched),
        );

        let mut engine = engine();
        engine.generate_vouchers(&output(records));

        let result = engine.post_vouchers(None);
        assert_eq!(result.posted, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(engine.vouchers()[0].status, VoucherStatus::Posted);
        assert!(engine.vouchers()[0].posted_at.is_some());

        // A second pass finds nothing left in GENERATED
        let again = engine.post_vouchers(None);
        assert_eq!(again.attempted, 0);
    }

    #[test]
    fn test_unbalanced_voucher_fails_posting() {
        let mut records = BTreeMap::new();
        records.insert(
            "100000000001".to_string(),
            record("100000000001", 15000, MatchStatus::Matched),
        );

        let mut engine = engine();
        engine.generate_vouchers(&output(records));
        // Corrupt one leg after generation
        engine.vouchers[0].gl_entries[1].credit_amount += Decimal::new(5, 2);

        let result = engine.post_vouchers(None);
        assert_eq!(result.failed, 1);
        assert_eq!(engine.vouchers()[0].status, VoucherStatus::Failed);
    }

    #[test]
    fn test_save_and_gl_statement() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "RUN_S");
        paths.ensure_layout().unwrap();

        let mut records = BTreeMap::new();
        records.insert(
            "100000000001".to_string(),
            record("100000000001", 15000, MatchStatus::Matched),
        );

        let mut engine = engine();
        let accounting = engine.generate_vouchers(&output(records));
        engine.save(&accounting, &paths).unwrap();
        assert!(paths.accounting_output().exists());

        let gl_path = engine.generate_gl_statement(&paths).unwrap();
        let text = std::fs::read_to_string(gl_path).unwrap();
        assert!(text.starts_with("Voucher_ID,RRN,Voucher_Type,Amount,Status,Created_At\n"));
        assert!(text.contains("VOUCHER_000001,100000000001,PAYMENT,150.00,generated,"));
    }
}
