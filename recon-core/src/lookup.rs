//! Owned lookup service over a loaded reconciliation result
//!
//! Adapters that need keyed access to a run's records (enquiry surfaces,
//! operator tooling) hold one instance and reload it explicitly. Lookups
//! resolve by RRN or by UPI transaction ID.

use crate::error::Result;
use crate::store::{load_json, RunPaths};
use crate::types::{ReconOutput, ReconRecord};
use std::collections::HashMap;

/// Keyed, reloadable view over one run's reconciliation output
#[derive(Debug, Default)]
pub struct LookupService {
    run_id: Option<String>,
    output: Option<ReconOutput>,
    txn_index: HashMap<String, String>,
}

impl LookupService {
    /// Empty service; nothing resolvable until [`LookupService::load`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or reload) the reconciliation output for a run
    pub fn load(&mut self, paths: &RunPaths) -> Result<()> {
        let output: ReconOutput = load_json(&paths.recon_output())?;

        let mut txn_index = HashMap::new();
        for (key, record) in &output.records {
            for txn in [&record.cbs, &record.switch, &record.npci]
                .into_iter()
                .flatten()
            {
                if let Some(upi) = &txn.upi_tran_id {
                    txn_index.insert(upi.clone(), key.clone());
                }
            }
        }

        tracing::info!(
            "lookup service loaded {} records for run {}",
            output.records.len(),
            paths.run_id()
        );

        self.run_id = Some(paths.run_id().to_string());
        self.output = Some(output);
        self.txn_index = txn_index;
        Ok(())
    }

    /// Run currently loaded
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Record keyed by RRN
    pub fn by_rrn(&self, rrn: &str) -> Option<&ReconRecord> {
        self.output.as_ref()?.records.get(rrn)
    }

    /// Record resolved through a UPI transaction ID
    pub fn by_upi_tran_id(&self, upi_tran_id: &str) -> Option<&ReconRecord> {
        let key = self.txn_index.get(upi_tran_id)?;
        self.output.as_ref()?.records.get(key)
    }

    /// Number of loaded records
    pub fn record_count(&self) -> usize {
        self.output.as_ref().map(|o| o.records.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::atomic_write_json;
    use crate::types::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn record(rrn: &str, upi: &str) -> ReconRecord {
        ReconRecord {
            cbs: Some(Txn {
                upi_tran_id: Some(upi.to_string()),
                rrn: Some(rrn.to_string()),
                amount: Decimal::new(15000, 2),
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
            }),
            switch: None,
            npci: None,
            status: MatchStatus::Orphan,
            exception_type: None,
            ttum_required: false,
            ttum_type: None,
            tcc_type: None,
            direction: Direction::Inward,
            cycle_id: Some("1C".to_string()),
            rollback_metadata: Vec::new(),
        }
    }

    #[test]
    fn test_load_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "RUN_L");
        paths.ensure_layout().unwrap();

        let mut records = BTreeMap::new();
        records.insert("123456789012".to_string(), record("123456789012", "UPI77"));
        let output = ReconOutput {
            run_id: "RUN_L".to_string(),
            generated_at: Utc::now(),
            cycle_id: Some("1C".to_string()),
            summary: ReconSummary::default(),
            records,
        };
        atomic_write_json(&paths.recon_output(), &output).unwrap();

        let mut lookup = LookupService::new();
        lookup.load(&paths).unwrap();

        assert_eq!(lookup.run_id(), Some("RUN_L"));
        assert_eq!(lookup.record_count(), 1);
        assert!(lookup.by_rrn("123456789012").is_some());
        assert!(lookup.by_upi_tran_id("UPI77").is_some());
        assert!(lookup.by_rrn("999999999999").is_none());
    }
}
