//! Pairwise matched, ageing, and hanging reports
//!
//! Six pairwise reports (GL vs Switch, Switch vs NPCI, GL vs NPCI, each
//! split inward/outward), unmatched ageing with day buckets, and hanging
//! lists. The ageing clock is injected so re-runs over the same inputs
//! emit byte-identical CSVs.

use crate::error::Result;
use crate::writer::write_report_pair;
use chrono::NaiveDate;
use recon_core::store::RunPaths;
use recon_core::types::{Direction, MatchStatus, ReconOutput, ReconRecord, Source};
use std::collections::BTreeMap;
use std::path::PathBuf;

const MATCHED_HEADERS: [&str; 11] = [
    "run_id",
    "cycle_id",
    "RRN",
    "UPI_Transaction_ID",
    "Amount",
    "Transaction_Date",
    "RC",
    "Source_System_1",
    "Source_System_2",
    "Direction",
    "Matched_On",
];

const AGEING_HEADERS: [&str; 10] = [
    "run_id",
    "cycle_id",
    "RRN",
    "Present_In",
    "Missing_In",
    "Amount",
    "Transaction_Date",
    "Ageing_Days",
    "Ageing_Bucket",
    "Unmatched_Reason",
];

const HANGING_HEADERS: [&str; 7] = [
    "run_id",
    "cycle_id",
    "RRN",
    "Amount",
    "Transaction_Date",
    "Present_In",
    "Exception_Type",
];

/// Ageing bucket for an unmatched record
pub fn ageing_bucket(age_days: i64) -> &'static str {
    if age_days <= 1 {
        "0-1 days"
    } else if age_days <= 3 {
        "2-3 days"
    } else {
        ">3 days"
    }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Inward => "Inward",
        Direction::Outward => "Outward",
    }
}

fn present_in(record: &ReconRecord) -> String {
    let mut sources = Vec::new();
    if record.cbs.is_some() {
        sources.push("CBS");
    }
    if record.switch.is_some() {
        sources.push("SWITCH");
    }
    if record.npci.is_some() {
        sources.push("NPCI");
    }
    sources.join("+")
}

fn missing_in(record: &ReconRecord) -> String {
    let mut sources = Vec::new();
    if record.cbs.is_none() {
        sources.push("CBS");
    }
    if record.switch.is_none() {
        sources.push("SWITCH");
    }
    if record.npci.is_none() {
        sources.push("NPCI");
    }
    sources.join("+")
}

/// Emits the full report set for a finalised reconciliation result
#[derive(Debug)]
pub struct ReportEmitter {
    today: NaiveDate,
}

impl ReportEmitter {
    /// Build an emitter with an explicit ageing clock
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Write every report for a run; returns the CSV paths written
    pub fn emit_all(&self, output: &ReconOutput, paths: &RunPaths) -> Result<Vec<PathBuf>> {
        let base = match output.cycle_id.as_deref() {
            Some(cycle) => paths.cycle_subdir(&paths.reports_dir(), cycle),
            None => paths.reports_dir(),
        };

        let mut written = Vec::new();
        written.extend(self.emit_pairwise(output, &base)?);
        written.extend(self.emit_ageing(output, &base)?);
        written.extend(self.emit_hanging(output, &base)?);
        Ok(written)
    }

    /// The six pairwise matched reports
    fn emit_pairwise(&self, output: &ReconOutput, base: &std::path::Path) -> Result<Vec<PathBuf>> {
        let pairs: [(&str, Source, Source); 3] = [
            ("GL_vs_Switch", Source::Cbs, Source::Switch),
            ("Switch_vs_NPCI", Source::Switch, Source::Npci),
            ("GL_vs_NPCI", Source::Cbs, Source::Npci),
        ];

        let mut rows: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for (pair, _, _) in &pairs {
            for dir in ["Inward", "Outward"] {
                rows.insert(format!("{}_{}", pair, dir), Vec::new());
            }
        }

        for (key, record) in &output.records {
            if !matches!(
                record.status,
                MatchStatus::Matched | MatchStatus::ForceMatched
            ) {
                continue;
            }
            for (pair, s1, s2) in &pairs {
                let (Some(r1), Some(r2)) = (record.source(*s1), record.source(*s2)) else {
                    continue;
                };
                // Pairwise rows require strict agreement on amount and date
                if r1.amount != r2.amount || r1.tran_date != r2.tran_date {
                    continue;
                }
                let report = format!("{}_{}", pair, direction_label(record.direction));
                rows.entry(report).or_default().push(vec![
                    output.run_id.clone(),
                    output.cycle_id.clone().unwrap_or_default(),
                    key.clone(),
                    record
                        .primary()
                        .and_then(|t| t.upi_tran_id.clone())
                        .unwrap_or_default(),
                    format!("{:.2}", r1.amount),
                    r1.tran_date.format("%Y-%m-%d").to_string(),
                    r1.rc.code(),
                    s1.to_string(),
                    s2.to_string(),
                    record.direction.to_string(),
                    "RRN".to_string(),
                ]);
            }
        }

        let mut written = Vec::new();
        for (name, report_rows) in &rows {
            let (csv_path, _) = write_report_pair(base, name, &MATCHED_HEADERS, report_rows)?;
            written.push(csv_path);
        }
        Ok(written)
    }

    /// Unmatched ageing, split inward/outward
    fn emit_ageing(&self, output: &ReconOutput, base: &std::path::Path) -> Result<Vec<PathBuf>> {
        let mut inward = Vec::new();
        let mut outward = Vec::new();

        for (key, record) in &output.records {
            if !matches!(
                record.status,
                MatchStatus::Mismatch
                    | MatchStatus::PartialMismatch
                    | MatchStatus::Orphan
                    | MatchStatus::Exception
                    | MatchStatus::Duplicate
                    | MatchStatus::Unknown
            ) {
                continue;
            }
            let Some(txn) = record.primary() else {
                continue;
            };
            let age_days = (self.today - txn.tran_date).num_days().max(0);

            let row = vec![
                output.run_id.clone(),
                output.cycle_id.clone().unwrap_or_default(),
                key.clone(),
                present_in(record),
                missing_in(record),
                format!("{:.2}", txn.amount),
                txn.tran_date.format("%Y-%m-%d").to_string(),
                age_days.to_string(),
                ageing_bucket(age_days).to_string(),
                record
                    .exception_type
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| record.status.to_string()),
            ];
            match record.direction {
                Direction::Inward => inward.push(row),
                Direction::Outward => outward.push(row),
            }
        }

        let mut written = Vec::new();
        let (csv_path, _) =
            write_report_pair(base, "Unmatched_Inward_Ageing", &AGEING_HEADERS, &inward)?;
        written.push(csv_path);
        let (csv_path, _) =
            write_report_pair(base, "Unmatched_Outward_Ageing", &AGEING_HEADERS, &outward)?;
        written.push(csv_path);
        Ok(written)
    }

    /// Hanging lists, split inward/outward
    fn emit_hanging(&self, output: &ReconOutput, base: &std::path::Path) -> Result<Vec<PathBuf>> {
        let mut inward = Vec::new();
        let mut outward = Vec::new();

        for (key, record) in &output.records {
            if record.status != MatchStatus::Hanging {
                continue;
            }
            let Some(txn) = record.primary() else {
                continue;
            };

            let row = vec![
                output.run_id.clone(),
                output.cycle_id.clone().unwrap_or_default(),
                key.clone(),
                format!("{:.2}", txn.amount),
                txn.tran_date.format("%Y-%m-%d").to_string(),
                present_in(record),
                record
                    .exception_type
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
            ];
            match record.direction {
                Direction::Inward => inward.push(row),
                Direction::Outward => outward.push(row),
            }
        }

        let mut written = Vec::new();
        let (csv_path, _) = write_report_pair(base, "Hanging_Inward", &HANGING_HEADERS, &inward)?;
        written.push(csv_path);
        let (csv_path, _) = write_report_pair(base, "Hanging_Outward", &HANGING_HEADERS, &outward)?;
        written.push(csv_path);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_core::types::{
        DrCr, ExceptionType, ReconSummary, ResponseCode, TranType, TtumType, Txn,
    };
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn txn(source: Source, rrn: &str, amount: i64, dr_cr: DrCr) -> Txn {
        Txn {
            upi_tran_id: Some(format!("UPI{}", rrn)),
            rrn: Some(rrn.to_string()),
            amount: Decimal::new(amount, 2),
            tran_date: NaiveDate::from_ymd_opt(2026, 1, 4).unwrap(),
            tran_time: None,
            dr_cr,
            rc: ResponseCode::Success,
            tran_type: TranType::default(),
            payer_psp: None,
            payee_psp: None,
            mcc: None,
            channel: None,
            source,
        }
    }

    fn matched_record(rrn: &str, direction: Direction) -> ReconRecord {
        ReconRecord {
            cbs: Some(txn(Source::Cbs, rrn, 15000, DrCr::Credit)),
            switch: Some(txn(Source::Switch, rrn, 15000, DrCr::Credit)),
            npci: Some(txn(Source::Npci, rrn, 15000, DrCr::Unspecified)),
            status: MatchStatus::Matched,
            exception_type: None,
            ttum_required: false,
            ttum_type: None,
            tcc_type: None,
            direction,
            cycle_id: Some("1C".to_string()),
            rollback_metadata: Vec::new(),
        }
    }

    fn output(records: BTreeMap<String, ReconRecord>) -> ReconOutput {
        ReconOutput {
            run_id: "RUN_R".to_string(),
            generated_at: Utc::now(),
            cycle_id: Some("1C".to_string()),
            summary: ReconSummary::default(),
            records,
        }
    }

    #[test]
    fn test_ageing_buckets() {
        assert_eq!(ageing_bucket(0), "0-1 days");
        assert_eq!(ageing_bucket(1), "0-1 days");
        assert_eq!(ageing_bucket(2), "2-3 days");
        assert_eq!(ageing_bucket(3), "2-3 days");
        assert_eq!(ageing_bucket(4), ">3 days");
    }

    #[test]
    fn test_matched_record_lands_in_all_three_pairwise_reports() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "RUN_R");
        paths.ensure_layout().unwrap();

        let mut records = BTreeMap::new();
        records.insert(
            "100000000001".to_string(),
            matched_record("100000000001", Direction::Inward),
        );
        let emitter = ReportEmitter::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        emitter.emit_all(&output(records), &paths).unwrap();

        let base = paths.cycle_subdir(&paths.reports_dir(), "1C");
        for name in ["GL_vs_Switch_Inward", "Switch_vs_NPCI_Inward", "GL_vs_NPCI_Inward"] {
            let text = std::fs::read_to_string(base.join(format!("{}.csv", name))).unwrap();
            assert!(text.contains("100000000001"), "{} missing row", name);
            assert!(text.contains("150.00"));
        }
        // Outward twin exists but is empty apart from the header
        let text =
            std::fs::read_to_string(base.join("GL_vs_Switch_Outward.csv")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_pairwise_skips_amount_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "RUN_R");
        paths.ensure_layout().unwrap();

        let mut record = matched_record("100000000002", Direction::Inward);
        record.switch.as_mut().unwrap().amount = Decimal::new(15001, 2);
        let mut records = BTreeMap::new();
        records.insert("100000000002".to_string(), record);

        let emitter = ReportEmitter::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        emitter.emit_all(&output(records), &paths).unwrap();

        let base = paths.cycle_subdir(&paths.reports_dir(), "1C");
        let gl_switch =
            std::fs::read_to_string(base.join("GL_vs_Switch_Inward.csv")).unwrap();
        assert_eq!(gl_switch.lines().count(), 1);
        // CBS and NPCI still agree
        let gl_npci = std::fs::read_to_string(base.join("GL_vs_NPCI_Inward.csv")).unwrap();
        assert_eq!(gl_npci.lines().count(), 2);
    }

    #[test]
    fn test_ageing_and_hanging_reports() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "RUN_R");
        paths.ensure_layout().unwrap();

        let mut records = BTreeMap::new();

        let mut orphan = matched_record("200000000001", Direction::Outward);
        orphan.switch = None;
        orphan.npci = None;
        orphan.status = MatchStatus::Orphan;
        orphan.exception_type = Some(ExceptionType::NpciFailed);
        orphan.ttum_required = true;
        orphan.ttum_type = Some(TtumType::Reversal);
        records.insert("200000000001".to_string(), orphan);

        let mut hanging = matched_record("300000000003", Direction::Outward);
        hanging.cbs = None;
        hanging.npci = None;
        hanging.status = MatchStatus::Hanging;
        hanging.exception_type = Some(ExceptionType::SwitchOnly);
        records.insert("300000000003".to_string(), hanging);

        // Aged 6 days relative to the injected clock
        let emitter = ReportEmitter::new(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        emitter.emit_all(&output(records), &paths).unwrap();

        let base = paths.cycle_subdir(&paths.reports_dir(), "1C");
        let ageing =
            std::fs::read_to_string(base.join("Unmatched_Outward_Ageing.csv")).unwrap();
        assert!(ageing.contains("200000000001"));
        assert!(ageing.contains(">3 days"));
        assert!(ageing.contains("CBS"));
        assert!(ageing.contains("SWITCH+NPCI"));

        let hanging_csv =
            std::fs::read_to_string(base.join("Hanging_Outward.csv")).unwrap();
        assert!(hanging_csv.contains("300000000003"));
        assert!(hanging_csv.contains("SWITCH_ONLY"));
    }
}
