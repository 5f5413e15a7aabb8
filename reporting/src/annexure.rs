//! NPCI Annexure IV adjustment files
//!
//! The Annexure IV CSV is position-validated by NPCI: the nine columns
//! must appear in a fixed order, `shtdat` is strict `YYYY-MM-DD`,
//! `adjsmt` carries exactly two decimals, and `Bankadjref` must be unique
//! within a file. Records are split into a TCC+RET file and a DRC+RRC
//! file under `annexure/`.

use crate::error::{Error, Result};
use crate::writer::write_csv_atomic;
use chrono::NaiveDate;
use recon_core::store::RunPaths;
use recon_core::types::{DrCr, MatchStatus, ReconOutput, ReconRecord};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::PathBuf;

/// Fixed column order required by NPCI; positional, not header-driven
pub const COLUMN_ORDER: [&str; 9] = [
    "Bankadjref",
    "Flag",
    "shtdat",
    "adjsmt",
    "Shser",
    "Shcrd",
    "FileName",
    "reason",
    "specifyother",
];

const BANKADJREF_MAX: usize = 100;
const SHSER_MAX: usize = 50;
const SHCRD_MAX: usize = 53;
const FILENAME_MAX: usize = 50;
const REASON_MAX: usize = 5;
const SPECIFYOTHER_MAX: usize = 400;

/// NPCI adjustment flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnexureFlag {
    /// Debit reversal confirmation
    Drc,
    /// Manual reconciliation required
    Rrc,
    /// Credit adjustment
    CrAdj,
    /// Transaction credit confirmation
    Tcc,
    /// Return
    Ret,
}

impl AnnexureFlag {
    /// Wire representation; note the mixed case of `Cr Adj`
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnexureFlag::Drc => "DRC",
            AnnexureFlag::Rrc => "RRC",
            AnnexureFlag::CrAdj => "Cr Adj",
            AnnexureFlag::Tcc => "TCC",
            AnnexureFlag::Ret => "RET",
        }
    }
}

/// One Annexure IV row before formatting
#[derive(Debug, Clone)]
pub struct AnnexureRecord {
    /// Bank adjustment reference; unique within the file
    pub bankadjref: String,
    /// Adjustment flag
    pub flag: AnnexureFlag,
    /// Settlement date
    pub shtdat: NaiveDate,
    /// Adjustment amount
    pub adjsmt: Decimal,
    /// RRN
    pub shser: String,
    /// NBIN plus identifier
    pub shcrd: String,
    /// Originating file name
    pub file_name: String,
    /// NPCI reason code; truncated to 5 characters
    pub reason: String,
    /// Bank remarks; truncated to 400 characters
    pub specifyother: String,
}

fn bankadjref_is_valid(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= BANKADJREF_MAX
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'\\' | b'/'))
}

fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        value.to_string()
    } else {
        value[..max].to_string()
    }
}

impl AnnexureRecord {
    /// Validate and format the record into its nine-column row.
    ///
    /// Overlong `reason` and `specifyother` values truncate; everything
    /// else fails validation.
    pub fn to_row(&self, index: usize) -> Result<Vec<String>> {
        if !bankadjref_is_valid(&self.bankadjref) {
            return Err(Error::AnnexureValidation {
                index,
                reason: format!("invalid Bankadjref '{}'", self.bankadjref),
            });
        }
        if self.shser.is_empty() || self.shser.len() > SHSER_MAX {
            return Err(Error::AnnexureValidation {
                index,
                reason: "Shser is mandatory, max 50 chars".to_string(),
            });
        }
        if self.shcrd.is_empty() || self.shcrd.len() > SHCRD_MAX {
            return Err(Error::AnnexureValidation {
                index,
                reason: "Shcrd is mandatory, max 53 chars".to_string(),
            });
        }
        if self.file_name.is_empty() || self.file_name.len() > FILENAME_MAX {
            return Err(Error::AnnexureValidation {
                index,
                reason: "FileName is mandatory, max 50 chars".to_string(),
            });
        }
        let reason = truncate(self.reason.trim(), REASON_MAX);
        if self.flag == AnnexureFlag::Ret && reason.is_empty() {
            return Err(Error::AnnexureValidation {
                index,
                reason: "RET flag requires a reason code".to_string(),
            });
        }

        Ok(vec![
            self.bankadjref.clone(),
            self.flag.as_str().to_string(),
            self.shtdat.format("%Y-%m-%d").to_string(),
            format!("{:.2}", self.adjsmt),
            self.shser.clone(),
            self.shcrd.clone(),
            self.file_name.clone(),
            reason,
            truncate(self.specifyother.trim(), SPECIFYOTHER_MAX),
        ])
    }
}

/// Derive the adjustment flag for a record, or None when no adjustment
/// belongs in the annexure.
///
/// The derivation chain is fixed: deemed responses and TCC tags first,
/// then returns, then mismatches, then orphans, then a debit/credit
/// fallback. Matched records carry no flag.
pub fn derive_flag(record: &ReconRecord) -> Option<AnnexureFlag> {
    let exc = record
        .exception_type
        .map(|e| e.to_string())
        .unwrap_or_default();

    let deemed = record
        .primary()
        .map(|t| t.rc.code().starts_with("RB"))
        .unwrap_or(false);
    if deemed || exc.contains("TCC") || record.tcc_type.is_some() {
        return Some(AnnexureFlag::Tcc);
    }
    if exc.contains("RET") || exc.contains("RETURN") || exc.contains("TIMEOUT") || exc.contains("NPCI_FAILED")
    {
        return Some(AnnexureFlag::Ret);
    }
    let status = record.status.to_string();
    if status.contains("MISMATCH") || status.contains("PARTIAL") {
        return Some(AnnexureFlag::Rrc);
    }
    if status.contains("ORPHAN") || exc.contains("UNMATCHED") {
        return Some(AnnexureFlag::Drc);
    }
    if record.status == MatchStatus::Matched || record.status == MatchStatus::ForceMatched {
        return None;
    }
    match record.primary().map(|t| t.dr_cr) {
        Some(DrCr::Credit) => Some(AnnexureFlag::CrAdj),
        Some(DrCr::Debit) => Some(AnnexureFlag::Drc),
        _ => None,
    }
}

/// Build annexure records for every flagged record in a run.
///
/// `Bankadjref` values derive from flag and RRN with a sequence suffix on
/// collision, so re-running over the same result set reproduces the same
/// file bytes.
pub fn build_annexure_records(output: &ReconOutput) -> Vec<AnnexureRecord> {
    let mut records = Vec::new();
    let mut used_refs: HashSet<String> = HashSet::new();

    for (key, record) in &output.records {
        let Some(flag) = derive_flag(record) else {
            continue;
        };
        let Some(txn) = record.primary() else {
            continue;
        };

        let base_ref = format!("BR_{}_{}", flag.as_str().replace(' ', ""), key);
        let mut bankadjref = base_ref.clone();
        let mut seq = 1;
        while !used_refs.insert(bankadjref.clone()) {
            seq += 1;
            bankadjref = format!("{}_{}", base_ref, seq);
        }

        records.push(AnnexureRecord {
            bankadjref,
            flag,
            shtdat: txn.tran_date,
            adjsmt: txn.amount,
            shser: txn.payer_psp.clone().unwrap_or_else(|| key.clone()),
            shcrd: txn
                .payee_psp
                .clone()
                .unwrap_or_else(|| format!("NBIN{}", key)),
            file_name: format!("ANNEXURE_{}.csv", output.run_id),
            reason: record
                .exception_type
                .map(|e| e.to_string())
                .unwrap_or_default(),
            specifyother: format!("RRN {}", key),
        });
    }
    records
}

/// Paths of the split annexure outputs
#[derive(Debug, Default)]
pub struct AnnexureOutputs {
    /// TCC and RET records
    pub tcc_ret: Option<PathBuf>,
    /// DRC, RRC, and credit-adjustment records
    pub drc_rrc: Option<PathBuf>,
}

/// Write the Annexure IV split pair under `annexure/`.
///
/// Enforces `Bankadjref` uniqueness per file and rejects the whole batch
/// on the first invalid record.
pub fn write_annexure_split(
    records: &[AnnexureRecord],
    paths: &RunPaths,
) -> Result<AnnexureOutputs> {
    let mut tcc_ret = Vec::new();
    let mut drc_rrc = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let row = record.to_row(index)?;
        match record.flag {
            AnnexureFlag::Tcc | AnnexureFlag::Ret => tcc_ret.push(row),
            _ => drc_rrc.push(row),
        }
    }

    for rows in [&tcc_ret, &drc_rrc] {
        let mut seen = HashSet::new();
        for row in rows.iter() {
            if !seen.insert(row[0].clone()) {
                return Err(Error::DuplicateBankAdjRef(row[0].clone()));
            }
        }
    }

    let run_id = paths.run_id().to_string();
    let dir = paths.annexure_dir();
    std::fs::create_dir_all(&dir).map_err(recon_core::Error::Io)?;

    let mut outputs = AnnexureOutputs::default();
    if !tcc_ret.is_empty() {
        let path = dir.join(format!("ANNEXURE_IV_TCC_RET_{}.csv", run_id));
        write_csv_atomic(&path, &COLUMN_ORDER, &tcc_ret)?;
        tracing::info!("generated {} ({} rows)", path.display(), tcc_ret.len());
        outputs.tcc_ret = Some(path);
    }
    if !drc_rrc.is_empty() {
        let path = dir.join(format!("ANNEXURE_IV_DRC_RRC_{}.csv", run_id));
        write_csv_atomic(&path, &COLUMN_ORDER, &drc_rrc)?;
        tracing::info!("generated {} ({} rows)", path.display(), drc_rrc.len());
        outputs.drc_rrc = Some(path);
    }
    Ok(outputs)
}
