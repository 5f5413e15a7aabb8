//! The eight-step ordered matching engine
//!
//! Orchestrates one reconciliation cycle: adjustment pre-pass, carry-over
//! resolution, the eight classification steps, the exception matrix, and
//! result assembly. Steps mutate the working tables only; nothing is
//! persisted here, so a failed or cancelled cycle leaves no state behind.

use crate::error::{Error, Result};
use crate::matrix::{ExceptionMatrix, MatrixAction, SourceStatus};
use crate::results;
use crate::tables::{Marking, RowStatus, SourceTable};
use recon_core::carryover::AUTO_TTUM_AGE;
use recon_core::types::{
    amounts_match, dates_match, CarryOverEntry, CarryOverState, Direction, ExceptionType,
    MatchStatus, ResponseCode, Source, TccType, TtumType, Txn,
};
use recon_core::Config;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Adjustment kind from the adjustment file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentType {
    /// Mark all sources matched regardless of classification
    ForceMatch,
    /// Overwrite the amount in every source
    AmountCorrection,
    /// Override the record status
    StatusOverride,
}

impl AdjustmentType {
    /// Parse an `Adjtype` cell
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "FORCE_MATCH" => Some(AdjustmentType::ForceMatch),
            "AMOUNT_CORRECTION" => Some(AdjustmentType::AmountCorrection),
            "STATUS_OVERRIDE" => Some(AdjustmentType::StatusOverride),
            _ => None,
        }
    }
}

/// One row of the adjustments table
#[derive(Debug, Clone)]
pub struct AdjustmentRow {
    /// Target RRN
    pub rrn: String,
    /// What to do
    pub adj_type: AdjustmentType,
    /// Corrected amount for `AMOUNT_CORRECTION`
    pub amount: Option<Decimal>,
    /// Target status for `STATUS_OVERRIDE`
    pub response: Option<String>,
}

/// Normalize a parsed adjustments table.
///
/// Expected columns: `RRN`, `Adjtype`, `Adjamount`, and an optional
/// `Response` carrying the target status for overrides. Rows with an
/// unknown adjustment type are skipped with a warning.
pub fn normalize_adjustments(table: &recon_core::normalize::RawTable) -> Vec<AdjustmentRow> {
    use recon_core::normalize::{find_column, parse_amount};

    let rrn_idx = find_column(&table.headers, &["rrn"]);
    let type_idx = find_column(&table.headers, &["adjtype", "adj_type", "adjustment type"]);
    let amount_idx = find_column(&table.headers, &["adjamount", "adj_amount", "adjustment amount"]);
    let response_idx = find_column(&table.headers, &["response", "new_status"]);

    let (Some(rrn_idx), Some(type_idx)) = (rrn_idx, type_idx) else {
        tracing::warn!("adjustment table missing RRN or Adjtype column; ignoring file");
        return Vec::new();
    };

    let mut adjustments = Vec::new();
    for (row_no, row) in table.rows.iter().enumerate() {
        let rrn = row.get(rrn_idx).map(|s| s.trim()).unwrap_or("");
        if rrn.is_empty() {
            continue;
        }
        let raw_type = row.get(type_idx).map(|s| s.trim()).unwrap_or("");
        let Some(adj_type) = AdjustmentType::parse(raw_type) else {
            tracing::warn!("row {}: unknown adjustment type '{}'", row_no, raw_type);
            continue;
        };

        adjustments.push(AdjustmentRow {
            rrn: rrn.to_string(),
            adj_type,
            amount: amount_idx
                .and_then(|i| row.get(i))
                .and_then(|s| parse_amount(s)),
            response: response_idx
                .and_then(|i| row.get(i))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        });
    }
    adjustments
}

/// Normalized inputs for one cycle
#[derive(Debug, Default)]
pub struct EngineInput {
    /// CBS rows in file order
    pub cbs: Vec<Txn>,
    /// Switch rows in file order
    pub switch: Vec<Txn>,
    /// NPCI rows in file order
    pub npci: Vec<Txn>,
    /// Optional adjustment rows
    pub adjustments: Vec<AdjustmentRow>,
}

/// Result of one engine cycle
#[derive(Debug)]
pub struct EngineOutcome {
    /// Classified records plus summary
    pub output: recon_core::types::ReconOutput,
    /// Carry-over state for the next cycle
    pub carry_over: CarryOverState,
}

/// The eight-step ordered classifier
pub struct MatchingEngine {
    config: Config,
    matrix: ExceptionMatrix,
    cancel: Option<Arc<AtomicBool>>,
}

impl MatchingEngine {
    /// Build an engine from configuration
    pub fn new(config: Config) -> Self {
        let matrix = ExceptionMatrix::from_config(&config.exception_matrix);
        Self {
            config,
            matrix,
            cancel: None,
        }
    }

    /// Attach a cancellation flag, checked at every step boundary
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn checkpoint(&self) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    /// Run one reconciliation cycle over normalized inputs.
    ///
    /// `prev_carry` is the carry-over state written by the previous cycle;
    /// the outcome contains the state the caller must persist for the next
    /// one. Nothing is written to disk here.
    pub fn run_cycle(
        &self,
        run_id: &str,
        cycle_id: Option<&str>,
        input: EngineInput,
        prev_carry: CarryOverState,
    ) -> Result<EngineOutcome> {
        tracing::info!(
            "starting reconciliation cycle {:?} for run {}: {} CBS / {} Switch / {} NPCI rows",
            cycle_id,
            run_id,
            input.cbs.len(),
            input.switch.len(),
            input.npci.len()
        );

        let mut cbs = SourceTable::from_txns(Source::Cbs, input.cbs);
        let mut switch = SourceTable::from_txns(Source::Switch, input.switch);
        let mut npci = SourceTable::from_txns(Source::Npci, input.npci);

        self.checkpoint()?;
        if !input.adjustments.is_empty() {
            self.step_0_adjustments(&input.adjustments, &mut cbs, &mut switch, &mut npci);
        }

        let carried = self.apply_carry_over(prev_carry, &mut switch, &npci, cycle_id);

        self.checkpoint()?;
        self.step_1_cut_off(&cbs, &mut switch, &mut npci);
        self.checkpoint()?;
        self.step_2_self_match(&mut cbs);
        self.step_2_self_match(&mut switch);
        self.step_2_self_match(&mut npci);
        self.checkpoint()?;
        self.step_3_settlement_lumps(&mut cbs);
        self.checkpoint()?;
        self.step_4_double_debit_credit(&mut cbs);
        self.step_4_double_debit_credit(&mut switch);
        self.checkpoint()?;
        self.step_5_three_way(&mut cbs, &mut switch, &mut npci)?;
        self.checkpoint()?;
        self.step_6_deemed_accepted(&mut cbs, &mut switch, &mut npci);
        self.checkpoint()?;
        self.step_7_npci_declines(&mut cbs, &mut npci);
        self.checkpoint()?;
        self.step_8_failed_auto_reversal(&mut cbs, &mut npci);
        self.checkpoint()?;

        self.apply_exception_matrix(&mut cbs, &mut switch, &mut npci);
        self.checkpoint()?;

        let carry_over = next_carry_state(carried, &switch, &npci, cycle_id);
        let output = results::assemble(
            run_id,
            cycle_id,
            &cbs,
            &switch,
            &npci,
            self.config.amount_epsilon,
        );

        tracing::info!(
            "cycle {:?} complete: {} records, {} carry-over entries",
            cycle_id,
            output.records.len(),
            carry_over.entries.len()
        );

        Ok(EngineOutcome { output, carry_over })
    }

    /// Step 0: apply operator adjustments before any classification
    fn step_0_adjustments(
        &self,
        adjustments: &[AdjustmentRow],
        cbs: &mut SourceTable,
        switch: &mut SourceTable,
        npci: &mut SourceTable,
    ) {
        tracing::info!("step 0: applying {} adjustment entries", adjustments.len());

        for adj in adjustments {
            if adj.rrn.is_empty() {
                continue;
            }
            match adj.adj_type {
                AdjustmentType::ForceMatch => {
                    for table in [&mut *cbs, &mut *switch, &mut *npci] {
                        for idx in table.rows_for_rrn(&adj.rrn).to_vec() {
                            table.mark(
                                idx,
                                &Marking::matched_with(ExceptionType::AdjustmentForceMatch),
                            );
                        }
                    }
                }
                AdjustmentType::AmountCorrection => {
                    let Some(amount) = adj.amount else {
                        tracing::warn!("AMOUNT_CORRECTION for {} has no amount", adj.rrn);
                        continue;
                    };
                    for table in [&mut *cbs, &mut *switch, &mut *npci] {
                        for idx in table.rows_for_rrn(&adj.rrn).to_vec() {
                            table.set_amount(idx, amount);
                            table.tag_exception(idx, ExceptionType::AdjustmentAmountCorrection);
                        }
                    }
                }
                AdjustmentType::StatusOverride => {
                    let status = adj
                        .response
                        .as_deref()
                        .and_then(MatchStatus::parse)
                        .unwrap_or(MatchStatus::Matched);
                    for table in [&mut *cbs, &mut *switch, &mut *npci] {
                        for idx in table.rows_for_rrn(&adj.rrn).to_vec() {
                            table.mark_override(
                                idx,
                                status,
                                ExceptionType::AdjustmentStatusOverride,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Resolve or age the previous cycle's carry-over entries.
    ///
    /// Entries whose RRN reappears in the current NPCI file are dropped as
    /// resolved. The rest age by one cycle; at [`AUTO_TTUM_AGE`] the Switch
    /// row is marked for an automatic TTUM and the entry is dropped.
    fn apply_carry_over(
        &self,
        prev: CarryOverState,
        switch: &mut SourceTable,
        npci: &SourceTable,
        cycle_id: Option<&str>,
    ) -> Vec<CarryOverEntry> {
        if prev.entries.is_empty() {
            return Vec::new();
        }
        tracing::info!("resolving {} carry-over entries", prev.entries.len());

        let mut carried = Vec::new();
        for mut entry in prev.entries {
            if entry.rrn.is_empty() {
                continue;
            }
            if npci.has_rrn(&entry.rrn) {
                tracing::debug!("carry-over {} resolved by current NPCI file", entry.rrn);
                continue;
            }

            entry.cycles_persisted += 1;
            if entry.cycles_persisted >= AUTO_TTUM_AGE {
                let ttum_type = if entry.dr_cr.is_debit() {
                    TtumType::Reversal
                } else {
                    TtumType::BeneficiaryCredit
                };
                for idx in switch.rows_for_rrn(&entry.rrn).to_vec() {
                    switch.mark(
                        idx,
                        &Marking::unmatched(Some(ExceptionType::CarryOverTtum))
                            .with_ttum(ttum_type),
                    );
                }
                tracing::info!(
                    "carry-over {} aged {} cycles, auto-TTUM {} triggered",
                    entry.rrn,
                    entry.cycles_persisted,
                    ttum_type
                );
                continue;
            }

            entry.last_cycle_id = cycle_id.map(str::to_string);
            carried.push(entry);
        }
        carried
    }

    /// Step 1: cut-off detection plus Switch-only hanging
    fn step_1_cut_off(&self, cbs: &SourceTable, switch: &mut SourceTable, npci: &mut SourceTable) {
        tracing::info!("step 1: cut-off detection");
        let cut_off = self.config.cut_off_time();
        let epsilon = self.config.amount_epsilon;
        let tolerance = self.config.date_tolerance_days;

        let mut hanging = Vec::new();
        for idx in npci.unprocessed() {
            let txn = npci.txn(idx);

            // Partial counterpart: same RRN and close date, diverging amount
            let mut is_cut_off = false;
            if let Some(rrn) = txn.rrn.as_deref() {
                'sources: for other in [cbs, &*switch] {
                    for &oidx in other.rows_for_rrn(rrn) {
                        let o = other.txn(oidx);
                        if dates_match(o.tran_date, txn.tran_date, tolerance)
                            && !amounts_match(o.amount, txn.amount, epsilon)
                        {
                            is_cut_off = true;
                            break 'sources;
                        }
                    }
                }
            }

            // Past the settlement cut-off: the reversal leg lands next cycle
            if !is_cut_off {
                if let Some(time) = txn.tran_time {
                    if time >= cut_off {
                        is_cut_off = true;
                    }
                }
            }

            if is_cut_off {
                hanging.push(idx);
            }
        }
        for idx in &hanging {
            npci.mark(*idx, &Marking::hanging(ExceptionType::CutOff));
        }

        // Present in Switch, absent from NPCI
        let npci_rrns: HashSet<String> = npci.rrns().map(str::to_string).collect();
        let mut switch_only = Vec::new();
        for idx in switch.unprocessed() {
            if let Some(rrn) = switch.txn(idx).rrn.as_deref() {
                if !npci_rrns.contains(rrn) {
                    switch_only.push(idx);
                }
            }
        }
        for idx in &switch_only {
            switch.mark(*idx, &Marking::hanging(ExceptionType::SwitchOnly));
        }

        tracing::info!(
            "step 1: {} cut-off, {} switch-only hanging rows",
            hanging.len(),
            switch_only.len()
        );
    }

    /// Step 2: absorb same-source auto-reversal pairs
    fn step_2_self_match(&self, table: &mut SourceTable) {
        let mut groups: BTreeMap<(String, String, chrono::NaiveDate, Decimal), Vec<usize>> =
            BTreeMap::new();
        for idx in table.unprocessed() {
            let txn = table.txn(idx);
            if let (Some(upi), Some(rrn)) = (txn.upi_tran_id.as_deref(), txn.rrn.as_deref()) {
                groups
                    .entry((upi.to_string(), rrn.to_string(), txn.tran_date, txn.amount))
                    .or_default()
                    .push(idx);
            }
        }

        let mut matched = 0usize;
        for (_, idxs) in groups {
            if idxs.len() != 2 {
                continue;
            }
            let a = table.txn(idxs[0]).dr_cr;
            let b = table.txn(idxs[1]).dr_cr;
            if a.is_opposite(b) {
                for idx in idxs {
                    table.mark(idx, &Marking::matched_with(ExceptionType::SelfMatched));
                }
                matched += 1;
            }
        }
        if matched > 0 {
            tracing::info!(
                "step 2: {} self-matched pairs absorbed in {}",
                matched,
                table.source()
            );
        }
    }

    /// Step 3: pair off settlement lump entries in CBS
    fn step_3_settlement_lumps(&self, cbs: &mut SourceTable) {
        tracing::info!("step 3: settlement entry identification");
        let threshold = Decimal::from(1000);
        let unprocessed = cbs.unprocessed();

        let mut pairs: Vec<(usize, usize)> = Vec::new();
        let mut consumed: HashSet<usize> = HashSet::new();

        for &idx in &unprocessed {
            if consumed.contains(&idx) {
                continue;
            }
            let txn = cbs.txn(idx);
            let no_rrn = txn.rrn.as_deref().map(str::is_empty).unwrap_or(true);
            if !no_rrn || txn.amount <= threshold {
                continue;
            }
            let dr_cr = txn.dr_cr;
            if !dr_cr.is_debit() && !dr_cr.is_credit() {
                continue;
            }

            for &oidx in &unprocessed {
                if oidx == idx || consumed.contains(&oidx) {
                    continue;
                }
                let other = cbs.txn(oidx);
                if other.amount == txn.amount && dr_cr.is_opposite(other.dr_cr) {
                    pairs.push((idx, oidx));
                    consumed.insert(idx);
                    consumed.insert(oidx);
                    break;
                }
            }
        }

        for (a, b) in &pairs {
            cbs.mark(*a, &Marking::matched_with(ExceptionType::SettlementEntry));
            cbs.mark(*b, &Marking::matched_with(ExceptionType::SettlementEntry));
        }
        tracing::info!("step 3: {} settlement pairs absorbed", pairs.len());
    }

    /// Step 4: classify multiple postings per RRN
    fn step_4_double_debit_credit(&self, table: &mut SourceTable) {
        // Group the remaining rows by non-empty RRN, preserving first-seen order
        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for idx in table.unprocessed() {
            if let Some(rrn) = table.txn(idx).rrn.as_deref().filter(|r| !r.is_empty()) {
                if !groups.contains_key(rrn) {
                    order.push(rrn.to_string());
                }
                groups.entry(rrn.to_string()).or_default().push(idx);
            }
        }

        let mut doubles = 0usize;
        for rrn in order {
            let idxs = &groups[&rrn];
            if idxs.len() < 2 {
                continue;
            }

            if idxs.len() == 2 {
                let a = table.txn(idxs[0]).dr_cr;
                let b = table.txn(idxs[1]).dr_cr;
                if a.is_opposite(b) {
                    // Self-reversal that step 2 could not see (differing UPI ids)
                    for &idx in idxs {
                        table.mark(idx, &Marking::matched_with(ExceptionType::SelfMatched));
                    }
                    continue;
                }
            }

            let has_dr = idxs.iter().any(|&i| table.txn(i).dr_cr.is_debit());
            let has_cr = idxs.iter().any(|&i| table.txn(i).dr_cr.is_credit());
            let ttum_type = if has_dr && has_cr {
                TtumType::Reversal
            } else {
                TtumType::Investigation
            };
            for &idx in idxs {
                table.mark(
                    idx,
                    &Marking::unmatched(Some(ExceptionType::DoubleDebitCredit)).with_ttum(ttum_type),
                );
            }
            doubles += 1;
            tracing::info!(
                "step 4: {} double debit/credit rows for RRN {} in {}",
                idxs.len(),
                rrn,
                table.source()
            );
        }
        if doubles > 0 {
            tracing::info!("step 4: {} double debit/credit groups in {}", doubles, table.source());
        }
    }

    /// Step 5: three-way strict matching, tightest config first
    fn step_5_three_way(
        &self,
        cbs: &mut SourceTable,
        switch: &mut SourceTable,
        npci: &mut SourceTable,
    ) -> Result<()> {
        tracing::info!("step 5: three-way matching");
        let mut matched = 0usize;

        for idx in npci.unprocessed() {
            if npci.is_processed(idx) {
                continue;
            }
            let txn = npci.txn(idx).clone();
            if txn.rc != ResponseCode::Success {
                continue;
            }

            for config in &self.config.matching {
                let mut applicable = true;
                for field in &config.required_fields {
                    if !field_present(&txn, field)? {
                        applicable = false;
                        break;
                    }
                }
                if !applicable {
                    continue;
                }

                let cbs_idx = self.find_candidate(cbs, &txn, &config.params)?;
                let switch_idx = self.find_candidate(switch, &txn, &config.params)?;

                if let (Some(c), Some(s)) = (cbs_idx, switch_idx) {
                    cbs.mark(c, &Marking::matched());
                    switch.mark(s, &Marking::matched());
                    npci.mark(idx, &Marking::matched());
                    matched += 1;
                    tracing::debug!(
                        "step 5: matched {:?} under config '{}'",
                        txn.rrn,
                        config.name
                    );
                    break;
                }
            }
        }

        tracing::info!("step 5: {} three-way matches", matched);
        Ok(())
    }

    /// First unprocessed row agreeing with the NPCI row on every param.
    ///
    /// Ties resolve to insertion order; the RRN index narrows the scan when
    /// the config includes RRN.
    fn find_candidate(
        &self,
        table: &SourceTable,
        npci_txn: &Txn,
        params: &[String],
    ) -> Result<Option<usize>> {
        let epsilon = self.config.amount_epsilon;
        let tolerance = self.config.date_tolerance_days;

        let candidates: Vec<usize> = if params.iter().any(|p| p == "RRN") {
            match npci_txn.rrn.as_deref() {
                Some(rrn) => table.unprocessed_rows_for_rrn(rrn),
                None => return Ok(None),
            }
        } else {
            table.unprocessed()
        };

        'rows: for idx in candidates {
            let txn = table.txn(idx);
            for param in params {
                let agrees = match param.as_str() {
                    "RRN" => txn.rrn.is_some() && txn.rrn == npci_txn.rrn,
                    "Amount" => amounts_match(txn.amount, npci_txn.amount, epsilon),
                    "Tran_Date" => dates_match(txn.tran_date, npci_txn.tran_date, tolerance),
                    "UPI_Tran_ID" => {
                        txn.upi_tran_id.is_some() && txn.upi_tran_id == npci_txn.upi_tran_id
                    }
                    other => {
                        return Err(Error::MatchingConfig(format!(
                            "unknown matching field '{}'",
                            other
                        )))
                    }
                };
                if !agrees {
                    continue 'rows;
                }
            }
            return Ok(Some(idx));
        }
        Ok(None)
    }

    /// Step 6: deemed-accepted responses become TCC 102 or TCC 103
    fn step_6_deemed_accepted(
        &self,
        cbs: &mut SourceTable,
        switch: &mut SourceTable,
        npci: &mut SourceTable,
    ) {
        tracing::info!("step 6: deemed-accepted handling");
        for idx in npci.unprocessed() {
            let txn = npci.txn(idx).clone();
            if txn.rc != ResponseCode::Deemed {
                continue;
            }

            let cbs_debits: Vec<usize> = match txn.rrn.as_deref() {
                Some(rrn) => cbs
                    .unprocessed_rows_for_rrn(rrn)
                    .into_iter()
                    .filter(|&i| cbs.txn(i).dr_cr.is_debit())
                    .collect(),
                None => Vec::new(),
            };

            if !cbs_debits.is_empty() {
                // TCC 102: the remitter debit exists, acknowledge the credit
                npci.mark(
                    idx,
                    &Marking::matched_with(ExceptionType::Tcc102).with_tcc(TccType::Tcc102),
                );
                for c in cbs_debits {
                    cbs.mark(
                        c,
                        &Marking::matched_with(ExceptionType::Tcc102).with_tcc(TccType::Tcc102),
                    );
                }
                if let Some(rrn) = txn.rrn.as_deref() {
                    for s in switch.unprocessed_rows_for_rrn(rrn) {
                        switch.mark(s, &Marking::matched_with(ExceptionType::Tcc102));
                    }
                }
            } else {
                // TCC 103: no bank credit yet, request one
                npci.mark(
                    idx,
                    &Marking::unmatched(Some(ExceptionType::Tcc103))
                        .with_ttum(TtumType::BeneficiaryCredit)
                        .with_tcc(TccType::Tcc103),
                );
            }
        }
    }

    /// Step 7: NPCI declines with bank postings get reversal TTUMs
    fn step_7_npci_declines(&self, cbs: &mut SourceTable, npci: &mut SourceTable) {
        tracing::info!("step 7: NPCI declined transactions");
        for idx in npci.unprocessed() {
            let txn = npci.txn(idx).clone();
            if !txn.rc.is_fail() {
                continue;
            }

            if let Some(rrn) = txn.rrn.as_deref() {
                for c in cbs.unprocessed_rows_for_rrn(rrn) {
                    cbs.mark(
                        c,
                        &Marking::unmatched(Some(ExceptionType::NpciFailed))
                            .with_ttum(TtumType::Reversal),
                    );
                }
            }
            npci.mark(idx, &Marking::unmatched(Some(ExceptionType::NpciDeclined)));
        }
    }

    /// Step 8: network reversal pairs whose bank-side reversal never landed
    fn step_8_failed_auto_reversal(&self, cbs: &mut SourceTable, npci: &mut SourceTable) {
        tracing::info!("step 8: failed auto-credit reversals");

        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for idx in npci.unprocessed() {
            if let Some(rrn) = npci.txn(idx).rrn.as_deref().filter(|r| !r.is_empty()) {
                if !groups.contains_key(rrn) {
                    order.push(rrn.to_string());
                }
                groups.entry(rrn.to_string()).or_default().push(idx);
            }
        }

        for rrn in order {
            let idxs = &groups[&rrn];
            if idxs.len() != 2 {
                continue;
            }
            let a = npci.txn(idxs[0]);
            let b = npci.txn(idxs[1]);
            if a.amount != b.amount {
                continue;
            }
            // A same-sign pair with both legs tagged is a duplicate, not a reversal
            let both_specified = (a.dr_cr.is_debit() || a.dr_cr.is_credit())
                && (b.dr_cr.is_debit() || b.dr_cr.is_credit());
            if both_specified && !a.dr_cr.is_opposite(b.dr_cr) {
                continue;
            }

            let cbs_rows = cbs.unprocessed_rows_for_rrn(&rrn);
            if cbs_rows.len() != 1 {
                continue;
            }

            let marking = Marking::unmatched(Some(ExceptionType::FailedAutoReversal))
                .with_ttum(TtumType::Reversal);
            for &idx in idxs {
                npci.mark(idx, &marking);
            }
            cbs.mark(cbs_rows[0], &marking);
            tracing::info!("step 8: failed auto-reversal for RRN {}", rrn);
        }
    }

    /// Terminal disposition for whatever the eight steps left behind
    fn apply_exception_matrix(
        &self,
        cbs: &mut SourceTable,
        switch: &mut SourceTable,
        npci: &mut SourceTable,
    ) {
        tracing::info!("applying exception matrix to remaining CBS rows");

        for idx in cbs.unprocessed() {
            if cbs.is_processed(idx) {
                continue;
            }
            let txn = cbs.txn(idx).clone();
            let Some(rrn) = txn.rrn.clone().filter(|r| !r.is_empty()) else {
                continue;
            };

            let switch_idx = switch.unprocessed_rows_for_rrn(&rrn).first().copied();
            let npci_idx = npci.unprocessed_rows_for_rrn(&rrn).first().copied();

            // CBS presence is success; the others judge by response code
            let cbs_status = SourceStatus::Success;
            let switch_status = match switch_idx {
                Some(i) if switch.txn(i).rc == ResponseCode::Success => SourceStatus::Success,
                _ => SourceStatus::Failed,
            };
            let npci_status = match npci_idx {
                Some(i)
                    if matches!(
                        npci.txn(i).rc,
                        ResponseCode::Success | ResponseCode::Deemed
                    ) =>
                {
                    SourceStatus::Success
                }
                _ => SourceStatus::Failed,
            };

            let direction = if txn.dr_cr.is_debit() {
                Direction::Outward
            } else {
                Direction::Inward
            };

            match self
                .matrix
                .action(cbs_status, switch_status, npci_status, direction)
            {
                Some(action) => self.apply_matrix_action(
                    action, idx, switch_idx, npci_idx, cbs, switch, npci,
                ),
                None => {
                    cbs.mark(idx, &Marking::unmatched(Some(ExceptionType::UnmatchedNoRule)));
                    tracing::debug!(
                        "RRN {}: no matrix rule for {}_{}_{}",
                        rrn,
                        cbs_status,
                        switch_status,
                        npci_status
                    );
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_matrix_action(
        &self,
        action: MatrixAction,
        cbs_idx: usize,
        switch_idx: Option<usize>,
        npci_idx: Option<usize>,
        cbs: &mut SourceTable,
        switch: &mut SourceTable,
        npci: &mut SourceTable,
    ) {
        let npci_deemed = npci_idx
            .map(|i| npci.txn(i).rc == ResponseCode::Deemed)
            .unwrap_or(false);

        let mark_all = |marking: Marking,
                        cbs: &mut SourceTable,
                        switch: &mut SourceTable,
                        npci: &mut SourceTable| {
            cbs.mark(cbs_idx, &marking);
            if let Some(s) = switch_idx {
                switch.mark(s, &marking);
            }
            if let Some(n) = npci_idx {
                npci.mark(n, &marking);
            }
        };

        match action {
            MatrixAction::Matched => mark_all(Marking::matched(), cbs, switch, npci),
            MatrixAction::ConditionalTcc102 => {
                if npci_deemed {
                    mark_all(
                        Marking::matched_with(ExceptionType::Tcc102).with_tcc(TccType::Tcc102),
                        cbs,
                        switch,
                        npci,
                    );
                } else {
                    mark_all(Marking::matched(), cbs, switch, npci);
                }
            }
            MatrixAction::RemitterRefundTtum => mark_all(
                Marking::unmatched(Some(ExceptionType::RemitterRefund))
                    .with_ttum(TtumType::Reversal),
                cbs,
                switch,
                npci,
            ),
            MatrixAction::BeneficiaryRecoveryTtum => {
                if let Some(n) = npci_idx {
                    npci.mark(
                        n,
                        &Marking::unmatched(Some(ExceptionType::BeneficiaryRecovery))
                            .with_ttum(TtumType::BeneficiaryCredit),
                    );
                }
                // Consume the driving CBS row so the matrix pass is idempotent
                cbs.mark(cbs_idx, &Marking::unmatched(None));
            }
            MatrixAction::SwitchUpdate => {
                if let Some(s) = switch_idx {
                    switch.mark(s, &Marking::unmatched(Some(ExceptionType::SwitchUpdate)));
                }
                cbs.mark(cbs_idx, &Marking::unmatched(None));
            }
            MatrixAction::ConditionalTcc102SwitchUpdate => {
                if let Some(s) = switch_idx {
                    let mut marking = Marking::unmatched(Some(ExceptionType::SwitchUpdateTcc));
                    if npci_deemed {
                        marking = marking.with_tcc(TccType::Tcc102);
                    }
                    switch.mark(s, &marking);
                }
                cbs.mark(cbs_idx, &Marking::unmatched(None));
            }
            MatrixAction::RemitterRecoveryTtum => mark_all(
                Marking::unmatched(Some(ExceptionType::RemitterRecovery))
                    .with_ttum(TtumType::Recovery),
                cbs,
                switch,
                npci,
            ),
            MatrixAction::BeneficiaryCreditTtumTcc103 => {
                if let Some(n) = npci_idx {
                    npci.mark(
                        n,
                        &Marking::unmatched(Some(ExceptionType::BeneficiaryCreditTcc103))
                            .with_ttum(TtumType::BeneficiaryCredit)
                            .with_tcc(TccType::Tcc103),
                    );
                }
            }
            MatrixAction::Unmatched => mark_all(Marking::unmatched(None), cbs, switch, npci),
        }
    }
}

fn field_present(txn: &Txn, field: &str) -> Result<bool> {
    match field {
        "RRN" => Ok(txn.rrn.is_some()),
        "Amount" | "Tran_Date" => Ok(true),
        "UPI_Tran_ID" => Ok(txn.upi_tran_id.is_some()),
        other => Err(Error::MatchingConfig(format!(
            "unknown matching field '{}'",
            other
        ))),
    }
}

/// Build the next cycle's carry-over state from surviving entries plus this
/// cycle's newly hanging rows
fn next_carry_state(
    carried: Vec<CarryOverEntry>,
    switch: &SourceTable,
    npci: &SourceTable,
    cycle_id: Option<&str>,
) -> CarryOverState {
    let mut entries = carried;
    let mut seen: HashSet<String> = entries.iter().map(|e| e.rrn.clone()).collect();

    let mut push_hanging = |table: &SourceTable, idx: usize, reason: String| {
        let txn = table.txn(idx);
        if let Some(rrn) = txn.rrn.as_deref().filter(|r| !r.is_empty()) {
            if seen.insert(rrn.to_string()) {
                entries.push(CarryOverEntry {
                    rrn: rrn.to_string(),
                    amount: txn.amount,
                    dr_cr: txn.dr_cr,
                    reason,
                    first_seen_cycle: cycle_id.map(str::to_string),
                    last_cycle_id: cycle_id.map(str::to_string),
                    cycles_persisted: 0,
                });
            }
        }
    };

    for idx in 0..npci.len() {
        if npci.row_status(idx) == RowStatus::Hanging {
            let reason = npci
                .exception(idx)
                .map(|e| e.to_string())
                .unwrap_or_else(|| "HANGING".to_string());
            push_hanging(npci, idx, reason);
        }
    }
    for idx in 0..switch.len() {
        if switch.row_status(idx) == RowStatus::Hanging
            && switch.exception(idx) == Some(ExceptionType::SwitchOnly)
        {
            push_hanging(switch, idx, ExceptionType::SwitchOnly.to_string());
        }
    }

    CarryOverState {
        entries,
        last_cycle_id: cycle_id.map(str::to_string),
        updated_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use recon_core::types::{DrCr, TranType};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 4).unwrap()
    }

    fn txn(source: Source, rrn: &str, amount: i64, dr_cr: DrCr, rc: ResponseCode) -> Txn {
        Txn {
            upi_tran_id: None,
            rrn: if rrn.is_empty() { None } else { Some(rrn.to_string()) },
            amount: Decimal::new(amount, 2),
            tran_date: date(),
            tran_time: None,
            dr_cr,
            rc,
            tran_type: TranType::default(),
            payer_psp: None,
            payee_psp: None,
            mcc: None,
            channel: None,
            source,
        }
    }

    fn engine() -> MatchingEngine {
        MatchingEngine::new(Config::default())
    }

    fn run(input: EngineInput) -> EngineOutcome {
        engine()
            .run_cycle("RUN_T", Some("1C"), input, CarryOverState::default())
            .unwrap()
    }

    #[test]
    fn test_straight_three_way_match() {
        // S1: identical CBS, Switch, and NPCI views
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "100000000001", 15000, DrCr::Credit, ResponseCode::Success)],
            switch: vec![txn(
                Source::Switch,
                "100000000001",
                15000,
                DrCr::Credit,
                ResponseCode::Success,
            )],
            npci: vec![txn(
                Source::Npci,
                "100000000001",
                15000,
                DrCr::Unspecified,
                ResponseCode::Success,
            )],
            adjustments: vec![],
        });

        let record = &outcome.output.records["100000000001"];
        assert_eq!(record.status, MatchStatus::Matched);
        assert_eq!(record.populated_sources(), 3);
        assert_eq!(record.exception_type, None);
        assert_eq!(record.direction, Direction::Inward);
        assert_eq!(outcome.output.summary.matched_cbs, 1);
    }

    #[test]
    fn test_deemed_success_tcc_102() {
        // S2: NPCI answers RB, CBS carries the remitter debit
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "200000000002", 50000, DrCr::Debit, ResponseCode::Success)],
            switch: vec![txn(
                Source::Switch,
                "200000000002",
                50000,
                DrCr::Debit,
                ResponseCode::Success,
            )],
            npci: vec![txn(
                Source::Npci,
                "200000000002",
                50000,
                DrCr::Unspecified,
                ResponseCode::Deemed,
            )],
            adjustments: vec![],
        });

        let record = &outcome.output.records["200000000002"];
        assert_eq!(record.status, MatchStatus::Matched);
        assert_eq!(record.exception_type, Some(ExceptionType::Tcc102));
        assert_eq!(record.tcc_type, Some(TccType::Tcc102));
    }

    #[test]
    fn test_deemed_without_cbs_credit_is_tcc_103() {
        let outcome = run(EngineInput {
            cbs: vec![],
            switch: vec![],
            npci: vec![txn(
                Source::Npci,
                "200000000009",
                50000,
                DrCr::Unspecified,
                ResponseCode::Deemed,
            )],
            adjustments: vec![],
        });

        let record = &outcome.output.records["200000000009"];
        assert_eq!(record.status, MatchStatus::Orphan);
        assert_eq!(record.exception_type, Some(ExceptionType::Tcc103));
        assert!(record.ttum_required);
        assert_eq!(record.ttum_type, Some(TtumType::BeneficiaryCredit));
        assert_eq!(record.tcc_type, Some(TccType::Tcc103));
    }

    #[test]
    fn test_switch_only_goes_hanging() {
        // S3: Switch saw the transaction, NPCI never did
        let outcome = run(EngineInput {
            cbs: vec![],
            switch: vec![txn(
                Source::Switch,
                "300000000003",
                7500,
                DrCr::Debit,
                ResponseCode::Unspecified,
            )],
            npci: vec![],
            adjustments: vec![],
        });

        let record = &outcome.output.records["300000000003"];
        assert_eq!(record.status, MatchStatus::Hanging);
        assert_eq!(record.exception_type, Some(ExceptionType::SwitchOnly));

        let carry = &outcome.carry_over;
        assert_eq!(carry.entries.len(), 1);
        assert_eq!(carry.entries[0].rrn, "300000000003");
        assert_eq!(carry.entries[0].cycles_persisted, 0);
        assert_eq!(carry.last_cycle_id.as_deref(), Some("1C"));
    }

    #[test]
    fn test_carry_over_auto_ttum_at_age_two() {
        // S4: the entry has persisted one cycle already and ages to two
        let prev = CarryOverState {
            entries: vec![CarryOverEntry {
                rrn: "300000000003".to_string(),
                amount: Decimal::new(7500, 2),
                dr_cr: DrCr::Debit,
                reason: "SWITCH_ONLY".to_string(),
                first_seen_cycle: Some("1C".to_string()),
                last_cycle_id: Some("2C".to_string()),
                cycles_persisted: 1,
            }],
            last_cycle_id: Some("2C".to_string()),
            updated_at: chrono::Utc::now(),
        };

        let outcome = engine()
            .run_cycle(
                "RUN_T",
                Some("3C"),
                EngineInput {
                    cbs: vec![],
                    switch: vec![txn(
                        Source::Switch,
                        "300000000003",
                        7500,
                        DrCr::Debit,
                        ResponseCode::Unspecified,
                    )],
                    npci: vec![],
                    adjustments: vec![],
                },
                prev,
            )
            .unwrap();

        let record = &outcome.output.records["300000000003"];
        assert_eq!(record.exception_type, Some(ExceptionType::CarryOverTtum));
        assert!(record.ttum_required);
        assert_eq!(record.ttum_type, Some(TtumType::Reversal));
        // Aged entry is dropped from the next state
        assert!(outcome.carry_over.entries.is_empty());
    }

    #[test]
    fn test_carry_over_below_age_is_deferred() {
        let prev = CarryOverState {
            entries: vec![CarryOverEntry {
                rrn: "300000000003".to_string(),
                amount: Decimal::new(7500, 2),
                dr_cr: DrCr::Debit,
                reason: "SWITCH_ONLY".to_string(),
                first_seen_cycle: Some("1C".to_string()),
                last_cycle_id: Some("1C".to_string()),
                cycles_persisted: 0,
            }],
            last_cycle_id: Some("1C".to_string()),
            updated_at: chrono::Utc::now(),
        };

        let outcome = engine()
            .run_cycle("RUN_T", Some("2C"), EngineInput::default(), prev)
            .unwrap();

        assert_eq!(outcome.carry_over.entries.len(), 1);
        assert_eq!(outcome.carry_over.entries[0].cycles_persisted, 1);
    }

    #[test]
    fn test_carry_over_resolved_by_npci() {
        let prev = CarryOverState {
            entries: vec![CarryOverEntry {
                rrn: "300000000003".to_string(),
                amount: Decimal::new(7500, 2),
                dr_cr: DrCr::Debit,
                reason: "SWITCH_ONLY".to_string(),
                first_seen_cycle: Some("1C".to_string()),
                last_cycle_id: Some("1C".to_string()),
                cycles_persisted: 1,
            }],
            last_cycle_id: Some("1C".to_string()),
            updated_at: chrono::Utc::now(),
        };

        let outcome = engine()
            .run_cycle(
                "RUN_T",
                Some("2C"),
                EngineInput {
                    cbs: vec![],
                    switch: vec![],
                    npci: vec![txn(
                        Source::Npci,
                        "300000000003",
                        7500,
                        DrCr::Unspecified,
                        ResponseCode::Success,
                    )],
                    adjustments: vec![],
                },
                prev,
            )
            .unwrap();

        assert!(outcome.carry_over.entries.is_empty());
    }

    #[test]
    fn test_double_debit_same_sign() {
        // S5: two CBS debits for one RRN
        let outcome = run(EngineInput {
            cbs: vec![
                txn(Source::Cbs, "400000000004", 20000, DrCr::Debit, ResponseCode::Success),
                txn(Source::Cbs, "400000000004", 20000, DrCr::Debit, ResponseCode::Success),
            ],
            switch: vec![],
            npci: vec![],
            adjustments: vec![],
        });

        let record = &outcome.output.records["400000000004"];
        assert_eq!(record.status, MatchStatus::Duplicate);
        assert_eq!(record.exception_type, Some(ExceptionType::DoubleDebitCredit));
        assert!(record.ttum_required);
        assert_eq!(record.ttum_type, Some(TtumType::Investigation));
    }

    #[test]
    fn test_double_posting_with_opposite_signs_is_reversal_pair() {
        let outcome = run(EngineInput {
            cbs: vec![
                txn(Source::Cbs, "400000000005", 20000, DrCr::Debit, ResponseCode::Success),
                txn(Source::Cbs, "400000000005", 20000, DrCr::Credit, ResponseCode::Success),
            ],
            switch: vec![],
            npci: vec![],
            adjustments: vec![],
        });

        let record = &outcome.output.records["400000000005"];
        assert_eq!(record.status, MatchStatus::Matched);
        assert_eq!(record.exception_type, Some(ExceptionType::SelfMatched));
        assert!(!record.ttum_required);
    }

    #[test]
    fn test_npci_decline_reverses_cbs_posting() {
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "500000000005", 9900, DrCr::Debit, ResponseCode::Success)],
            switch: vec![],
            npci: vec![txn(
                Source::Npci,
                "500000000005",
                9900,
                DrCr::Unspecified,
                ResponseCode::Fail("U30".to_string()),
            )],
            adjustments: vec![],
        });

        let record = &outcome.output.records["500000000005"];
        assert_eq!(record.status, MatchStatus::Exception);
        assert!(record.ttum_required);
        assert_eq!(record.ttum_type, Some(TtumType::Reversal));
        // CBS carries NPCI_FAILED, the NPCI row NPCI_DECLINED; CBS wins the tag
        assert_eq!(record.exception_type, Some(ExceptionType::NpciFailed));
    }

    #[test]
    fn test_cut_off_time_boundary() {
        let mut at_cutoff = txn(
            Source::Npci,
            "600000000006",
            1000,
            DrCr::Unspecified,
            ResponseCode::Success,
        );
        at_cutoff.tran_time = NaiveTime::from_hms_opt(22, 30, 0);
        let mut before_cutoff = txn(
            Source::Npci,
            "600000000007",
            1000,
            DrCr::Unspecified,
            ResponseCode::Success,
        );
        before_cutoff.tran_time = NaiveTime::from_hms_opt(22, 29, 59);

        let outcome = run(EngineInput {
            cbs: vec![],
            switch: vec![],
            npci: vec![at_cutoff, before_cutoff],
            adjustments: vec![],
        });

        assert_eq!(
            outcome.output.records["600000000006"].status,
            MatchStatus::Hanging
        );
        assert_eq!(
            outcome.output.records["600000000006"].exception_type,
            Some(ExceptionType::CutOff)
        );
        assert_ne!(
            outcome.output.records["600000000007"].status,
            MatchStatus::Hanging
        );
    }

    #[test]
    fn test_self_match_absorbs_internal_reversal() {
        let mut debit = txn(Source::Cbs, "700000000007", 5000, DrCr::Debit, ResponseCode::Success);
        debit.upi_tran_id = Some("UPIX".to_string());
        let mut credit = txn(Source::Cbs, "700000000007", 5000, DrCr::Credit, ResponseCode::Success);
        credit.upi_tran_id = Some("UPIX".to_string());

        let outcome = run(EngineInput {
            cbs: vec![debit, credit],
            switch: vec![],
            npci: vec![],
            adjustments: vec![],
        });

        let record = &outcome.output.records["700000000007"];
        assert_eq!(record.status, MatchStatus::Matched);
        assert_eq!(record.exception_type, Some(ExceptionType::SelfMatched));
    }

    #[test]
    fn test_settlement_lump_pairing() {
        let big_dr = txn(Source::Cbs, "", 500000, DrCr::Debit, ResponseCode::Unspecified);
        let big_cr = txn(Source::Cbs, "", 500000, DrCr::Credit, ResponseCode::Unspecified);

        let mut cbs = SourceTable::from_txns(Source::Cbs, vec![big_dr, big_cr]);
        engine().step_3_settlement_lumps(&mut cbs);

        assert_eq!(cbs.row_status(0), RowStatus::Matched);
        assert_eq!(cbs.row_status(1), RowStatus::Matched);
        assert_eq!(cbs.exception(0), Some(ExceptionType::SettlementEntry));
    }

    #[test]
    fn test_failed_auto_reversal_pair() {
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "800000000008", 2500, DrCr::Debit, ResponseCode::Unspecified)],
            switch: vec![],
            npci: vec![
                txn(
                    Source::Npci,
                    "800000000008",
                    2500,
                    DrCr::Debit,
                    ResponseCode::Unspecified,
                ),
                txn(
                    Source::Npci,
                    "800000000008",
                    2500,
                    DrCr::Credit,
                    ResponseCode::Unspecified,
                ),
            ],
            adjustments: vec![],
        });

        let record = &outcome.output.records["800000000008"];
        assert_eq!(record.exception_type, Some(ExceptionType::FailedAutoReversal));
        assert!(record.ttum_required);
        assert_eq!(record.ttum_type, Some(TtumType::Reversal));
    }

    #[test]
    fn test_normalize_adjustments_table() {
        let table = recon_core::normalize::RawTable {
            headers: vec![
                "RRN".to_string(),
                "Adjtype".to_string(),
                "Adjamount".to_string(),
                "Response".to_string(),
            ],
            rows: vec![
                vec![
                    "900000000009".to_string(),
                    "FORCE_MATCH".to_string(),
                    String::new(),
                    String::new(),
                ],
                vec![
                    "900000000010".to_string(),
                    "AMOUNT_CORRECTION".to_string(),
                    "1,500.00".to_string(),
                    String::new(),
                ],
                vec![
                    "900000000011".to_string(),
                    "NOT_A_THING".to_string(),
                    String::new(),
                    String::new(),
                ],
            ],
        };

        let adjustments = normalize_adjustments(&table);
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[0].adj_type, AdjustmentType::ForceMatch);
        assert_eq!(adjustments[1].amount, Some(Decimal::new(150000, 2)));
    }

    #[test]
    fn test_adjustment_force_match() {
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "900000000009", 100, DrCr::Debit, ResponseCode::Success)],
            switch: vec![],
            npci: vec![],
            adjustments: vec![AdjustmentRow {
                rrn: "900000000009".to_string(),
                adj_type: AdjustmentType::ForceMatch,
                amount: None,
                response: None,
            }],
        });

        let record = &outcome.output.records["900000000009"];
        assert_eq!(record.status, MatchStatus::ForceMatched);
        assert_eq!(
            record.exception_type,
            Some(ExceptionType::AdjustmentForceMatch)
        );
    }

    #[test]
    fn test_adjustment_amount_correction_enables_match() {
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "900000000010", 10000, DrCr::Credit, ResponseCode::Success)],
            switch: vec![txn(
                Source::Switch,
                "900000000010",
                10000,
                DrCr::Credit,
                ResponseCode::Success,
            )],
            npci: vec![txn(
                Source::Npci,
                "900000000010",
                10500,
                DrCr::Unspecified,
                ResponseCode::Success,
            )],
            adjustments: vec![AdjustmentRow {
                rrn: "900000000010".to_string(),
                adj_type: AdjustmentType::AmountCorrection,
                amount: Some(Decimal::new(10000, 2)),
                response: None,
            }],
        });

        let record = &outcome.output.records["900000000010"];
        assert_eq!(record.status, MatchStatus::Matched);
        assert_eq!(record.npci.as_ref().unwrap().amount, Decimal::new(10000, 2));
    }

    #[test]
    fn test_remitter_refund_via_matrix() {
        // Outward (S,S,F): bank posted, NPCI answered nothing usable
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "110000000011", 30000, DrCr::Debit, ResponseCode::Success)],
            switch: vec![txn(
                Source::Switch,
                "110000000011",
                30000,
                DrCr::Debit,
                ResponseCode::Success,
            )],
            npci: vec![txn(
                Source::Npci,
                "110000000011",
                30000,
                DrCr::Unspecified,
                ResponseCode::Unspecified,
            )],
            adjustments: vec![],
        });

        let record = &outcome.output.records["110000000011"];
        assert_eq!(record.status, MatchStatus::Exception);
        assert_eq!(record.exception_type, Some(ExceptionType::RemitterRefund));
        assert!(record.ttum_required);
        assert_eq!(record.ttum_type, Some(TtumType::Reversal));
    }

    #[test]
    fn test_unknown_tuple_defaults_to_unmatched_no_rule() {
        // CBS-only posting: Switch and NPCI both failed, no matrix rule
        let outcome = run(EngineInput {
            cbs: vec![txn(Source::Cbs, "110000000012", 30000, DrCr::Debit, ResponseCode::Success)],
            switch: vec![],
            npci: vec![],
            adjustments: vec![],
        });

        let record = &outcome.output.records["110000000012"];
        assert_eq!(record.status, MatchStatus::Orphan);
        assert_eq!(record.exception_type, Some(ExceptionType::UnmatchedNoRule));
        assert!(!record.ttum_required);
    }

    #[test]
    fn test_cancellation_aborts_at_step_boundary() {
        let cancel = Arc::new(AtomicBool::new(true));
        let engine = MatchingEngine::new(Config::default()).with_cancel(cancel);
        let err = engine
            .run_cycle("RUN_T", None, EngineInput::default(), CarryOverState::default())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_unknown_matching_field_aborts_cycle() {
        let mut config = Config::default();
        config.matching[0].params.push("No_Such_Field".to_string());
        config.matching[0]
            .required_fields
            .retain(|f| f != "UPI_Tran_ID");
        let engine = MatchingEngine::new(config);

        let err = engine
            .run_cycle(
                "RUN_T",
                None,
                EngineInput {
                    cbs: vec![txn(Source::Cbs, "120000000012", 100, DrCr::Debit, ResponseCode::Success)],
                    switch: vec![txn(
                        Source::Switch,
                        "120000000012",
                        100,
                        DrCr::Debit,
                        ResponseCode::Success,
                    )],
                    npci: vec![txn(
                        Source::Npci,
                        "120000000012",
                        100,
                        DrCr::Unspecified,
                        ResponseCode::Success,
                    )],
                    adjustments: vec![],
                },
                CarryOverState::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::MatchingConfig(_)));
    }

    #[test]
    fn test_determinism_identical_inputs_identical_records() {
        let input = || EngineInput {
            cbs: vec![
                txn(Source::Cbs, "130000000013", 100, DrCr::Credit, ResponseCode::Success),
                txn(Source::Cbs, "140000000014", 200, DrCr::Debit, ResponseCode::Success),
            ],
            switch: vec![
                txn(Source::Switch, "130000000013", 100, DrCr::Credit, ResponseCode::Success),
                txn(Source::Switch, "140000000014", 200, DrCr::Debit, ResponseCode::Success),
            ],
            npci: vec![
                txn(Source::Npci, "130000000013", 100, DrCr::Unspecified, ResponseCode::Success),
                txn(
                    Source::Npci,
                    "140000000014",
                    200,
                    DrCr::Unspecified,
                    ResponseCode::Fail("91".to_string()),
                ),
            ],
            adjustments: vec![],
        };

        let a = run(input());
        let b = run(input());

        let ja = serde_json::to_string(&a.output.records).unwrap();
        let jb = serde_json::to_string(&b.output.records).unwrap();
        assert_eq!(ja, jb);
    }
}
