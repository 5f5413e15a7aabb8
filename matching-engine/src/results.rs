//! Result assembly: working tables to reconciliation records
//!
//! Each reconciliation key (RRN, or UPI transaction ID when RRN is absent)
//! collapses to one record holding at most one transaction per source.
//! Record-level status derives from the row-level marks; the ordering of
//! the checks below is part of the classifier's semantics.

use crate::tables::{RowStatus, SourceTable};
use recon_core::types::{
    amounts_match, Direction, DrCr, ExceptionType, MatchStatus, ReconOutput, ReconRecord,
    ReconSummary, TccType, TtumType,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Default)]
struct KeyRows {
    cbs: Vec<usize>,
    switch: Vec<usize>,
    npci: Vec<usize>,
}

/// Assemble the final output from the three classified tables
pub fn assemble(
    run_id: &str,
    cycle_id: Option<&str>,
    cbs: &SourceTable,
    switch: &SourceTable,
    npci: &SourceTable,
    epsilon: Decimal,
) -> ReconOutput {
    let mut by_key: BTreeMap<String, KeyRows> = BTreeMap::new();

    for (table, pick) in [
        (cbs, 0usize),
        (switch, 1usize),
        (npci, 2usize),
    ] {
        for idx in 0..table.len() {
            let Some(key) = table.txn(idx).key() else {
                continue;
            };
            let entry = by_key.entry(key.to_string()).or_default();
            match pick {
                0 => entry.cbs.push(idx),
                1 => entry.switch.push(idx),
                _ => entry.npci.push(idx),
            }
        }
    }

    let mut records = BTreeMap::new();
    for (key, rows) in &by_key {
        let record = build_record(rows, cbs, switch, npci, cycle_id, epsilon);
        records.insert(key.clone(), record);
    }

    let summary = summarize(cbs, switch, npci, &records);

    ReconOutput {
        run_id: run_id.to_string(),
        generated_at: chrono::Utc::now(),
        cycle_id: cycle_id.map(str::to_string),
        summary,
        records,
    }
}

struct RowView {
    status: RowStatus,
    processed: bool,
    override_status: Option<MatchStatus>,
    exception: Option<ExceptionType>,
    ttum_required: bool,
    ttum_type: Option<TtumType>,
    tcc_type: Option<TccType>,
}

fn views(table: &SourceTable, idxs: &[usize]) -> Vec<RowView> {
    idxs.iter()
        .map(|&i| RowView {
            status: table.row_status(i),
            processed: table.is_processed(i),
            override_status: table.override_status(i),
            exception: table.exception(i),
            ttum_required: table.ttum_required(i),
            ttum_type: table.ttum_type(i),
            tcc_type: table.tcc_type(i),
        })
        .collect()
}

fn build_record(
    rows: &KeyRows,
    cbs: &SourceTable,
    switch: &SourceTable,
    npci: &SourceTable,
    cycle_id: Option<&str>,
    epsilon: Decimal,
) -> ReconRecord {
    let cbs_txn = rows.cbs.first().map(|&i| cbs.txn(i).clone());
    let switch_txn = rows.switch.first().map(|&i| switch.txn(i).clone());
    let npci_txn = rows.npci.first().map(|&i| npci.txn(i).clone());

    let mut all_views = views(cbs, &rows.cbs);
    all_views.extend(views(switch, &rows.switch));
    all_views.extend(views(npci, &rows.npci));

    let populated = [&cbs_txn, &switch_txn, &npci_txn]
        .iter()
        .filter(|t| t.is_some())
        .count();

    let exception_type = all_views.iter().find_map(|v| v.exception);
    let ttum_required = all_views.iter().any(|v| v.ttum_required);
    let ttum_type = all_views.iter().find_map(|v| v.ttum_type);
    let tcc_type = all_views.iter().find_map(|v| v.tcc_type);

    let amounts: Vec<Decimal> = [&cbs_txn, &switch_txn, &npci_txn]
        .iter()
        .filter_map(|t| t.as_ref().map(|x| x.amount))
        .collect();
    let amounts_agree = amounts
        .windows(2)
        .all(|w| amounts_match(w[0], w[1], epsilon));

    let any_hanging = all_views.iter().any(|v| v.status == RowStatus::Hanging);
    let any_marked_unmatched = all_views
        .iter()
        .any(|v| v.processed && v.status == RowStatus::Unmatched && v.override_status.is_none());
    let any_matched = all_views.iter().any(|v| v.status == RowStatus::Matched);
    let override_status = all_views.iter().find_map(|v| v.override_status);

    // Check order is semantic: overrides beat everything, hanging beats
    // dispositions, explicit unmatched marks beat matches for mixed keys.
    let status = if let Some(status) = override_status {
        status
    } else if any_hanging {
        MatchStatus::Hanging
    } else if exception_type == Some(ExceptionType::DoubleDebitCredit) {
        MatchStatus::Duplicate
    } else if any_marked_unmatched {
        if populated == 1 {
            MatchStatus::Orphan
        } else if !amounts_agree {
            if populated == 3 {
                MatchStatus::Mismatch
            } else {
                MatchStatus::PartialMismatch
            }
        } else {
            MatchStatus::Exception
        }
    } else if any_matched {
        if exception_type == Some(ExceptionType::AdjustmentForceMatch) {
            MatchStatus::ForceMatched
        } else if populated == 2 {
            MatchStatus::PartialMatch
        } else {
            MatchStatus::Matched
        }
    } else {
        match populated {
            1 => MatchStatus::Orphan,
            2 => {
                if amounts_agree {
                    MatchStatus::PartialMatch
                } else {
                    MatchStatus::PartialMismatch
                }
            }
            3 => {
                if amounts_agree {
                    MatchStatus::Unknown
                } else {
                    MatchStatus::Mismatch
                }
            }
            _ => MatchStatus::Unknown,
        }
    };

    let direction = infer_direction(&cbs_txn, &switch_txn, &npci_txn);

    ReconRecord {
        cbs: cbs_txn,
        switch: switch_txn,
        npci: npci_txn,
        status,
        exception_type,
        ttum_required,
        ttum_type,
        tcc_type,
        direction,
        cycle_id: cycle_id.map(str::to_string),
        rollback_metadata: Vec::new(),
    }
}

/// Direction from transaction-type keywords, else the debit/credit indicator
fn infer_direction(
    cbs: &Option<recon_core::types::Txn>,
    switch: &Option<recon_core::types::Txn>,
    npci: &Option<recon_core::types::Txn>,
) -> Direction {
    for txn in [cbs, switch, npci].into_iter().flatten() {
        let text = txn.tran_type.text().to_ascii_uppercase();
        if text.contains("INWARD") {
            return Direction::Inward;
        }
        if text.contains("OUTWARD") {
            return Direction::Outward;
        }
    }
    for txn in [cbs, switch, npci].into_iter().flatten() {
        match txn.dr_cr {
            DrCr::Credit => return Direction::Inward,
            DrCr::Debit => return Direction::Outward,
            DrCr::Unspecified => continue,
        }
    }
    Direction::Inward
}

fn summarize(
    cbs: &SourceTable,
    switch: &SourceTable,
    npci: &SourceTable,
    records: &BTreeMap<String, ReconRecord>,
) -> ReconSummary {
    let mut summary = ReconSummary {
        total_cbs: cbs.len(),
        total_switch: switch.len(),
        total_npci: npci.len(),
        ..Default::default()
    };

    fn tally(table: &SourceTable) -> (usize, usize) {
        let mut matched = 0;
        let mut unmatched = 0;
        for idx in 0..table.len() {
            match table.row_status(idx) {
                RowStatus::Matched => matched += 1,
                RowStatus::Unmatched => unmatched += 1,
                RowStatus::Hanging => {}
            }
        }
        (matched, unmatched)
    }

    (summary.matched_cbs, summary.unmatched_cbs) = tally(cbs);
    (summary.matched_switch, summary.unmatched_switch) = tally(switch);
    (summary.matched_npci, summary.unmatched_npci) = tally(npci);

    for table in [cbs, switch, npci] {
        for idx in 0..table.len() {
            if table.row_status(idx) == RowStatus::Hanging {
                summary.hanging += 1;
            }
            let txn = table.txn(idx);
            match txn.dr_cr {
                DrCr::Credit => {
                    summary.inflow_count += 1;
                    summary.inflow_amount += txn.amount;
                }
                DrCr::Debit => {
                    summary.outflow_count += 1;
                    summary.outflow_amount += txn.amount;
                }
                DrCr::Unspecified => {}
            }
        }
    }

    summary.ttum_required = records.values().filter(|r| r.ttum_required).count();
    summary
}
