//! TTUM instruction file generation
//!
//! One CSV/XLSX pair per adjustment category under `ttum/` (or the cycle
//! subdirectory), in the clearing network's fourteen-column instruction
//! layout. The download marker written next to them gates the accounting
//! rollback.

use crate::accounts::{ttum_gl_accounts, IssuerActions, TtumCategory};
use crate::error::Result;
use chrono::Utc;
use recon_core::config::GlAccounts;
use recon_core::store::{atomic_write_json, load_json_or_default, DownloadMeta, RunPaths};
use recon_core::types::{
    ExceptionType, MatchStatus, ReconOutput, ReconRecord, TtumType,
};
use reporting::writer::write_report_pair;
use std::path::PathBuf;

const TTUM_HEADERS: [&str; 14] = [
    "InstructionType",
    "InstructionRefNo",
    "RRN",
    "Amount",
    "ValueDate",
    "DrCr",
    "RC",
    "Tran_Type",
    "AccountNo",
    "IFSC",
    "Narration",
    "TTUM_Code",
    "GL_Debit_Account",
    "GL_Credit_Account",
];

/// Whether a record belongs in a TTUM category file
fn belongs(category: TtumCategory, record: &ReconRecord) -> bool {
    let deemed = record
        .primary()
        .map(|t| t.rc.code().starts_with("RB"))
        .unwrap_or(false);
    let unmatched_status = matches!(
        record.status,
        MatchStatus::PartialMatch
            | MatchStatus::Orphan
            | MatchStatus::Mismatch
            | MatchStatus::PartialMismatch
    );

    match category {
        TtumCategory::Tcc => record.tcc_type.is_some() || deemed,
        TtumCategory::Drc | TtumCategory::Rrc => unmatched_status && record.tcc_type.is_none(),
        TtumCategory::Refund => record.ttum_type == Some(TtumType::Reversal),
        TtumCategory::Recovery => {
            record.ttum_type == Some(TtumType::Recovery)
                || record.exception_type == Some(ExceptionType::BeneficiaryRecovery)
        }
        TtumCategory::Ret => record.ttum_required || record.status == MatchStatus::Exception,
    }
}

fn row_for(
    category: TtumCategory,
    key: &str,
    record: &ReconRecord,
    accounts: &GlAccounts,
    issuer: &IssuerActions,
) -> Option<Vec<String>> {
    let txn = record.primary()?;

    let (gl_debit, gl_credit) = ttum_gl_accounts(
        category,
        record.direction,
        txn.dr_cr,
        accounts,
        issuer.get(key),
    );

    let dr_cr = if txn.dr_cr.is_debit() {
        "D"
    } else if txn.dr_cr.is_credit() {
        "C"
    } else {
        ""
    };

    let account_no = txn
        .payee_psp
        .clone()
        .or_else(|| txn.payer_psp.clone())
        .unwrap_or_default();

    Some(vec![
        category.as_str().to_string(),
        format!("TTUM_{}_{}", category.as_str(), key),
        key.to_string(),
        format!("{:.2}", txn.amount),
        txn.tran_date.format("%Y%m%d").to_string(),
        dr_cr.to_string(),
        txn.rc.code(),
        txn.tran_type.text(),
        account_no,
        txn.payer_psp.clone().unwrap_or_default(),
        format!("{} for {}", category.as_str(), key),
        category.as_str().to_string(),
        gl_debit,
        gl_credit,
    ])
}

/// Generate every TTUM category file for a run.
///
/// Returns the CSV paths written. Categories with no rows still produce
/// header-only files so downstream pickups see a complete set.
pub fn generate_ttum_files(
    output: &ReconOutput,
    paths: &RunPaths,
    accounts: &GlAccounts,
    issuer: &IssuerActions,
) -> Result<Vec<PathBuf>> {
    let base = match output.cycle_id.as_deref() {
        Some(cycle) => paths.cycle_subdir(&paths.ttum_dir(), cycle),
        None => paths.ttum_dir(),
    };

    let mut written = Vec::new();
    for category in TtumCategory::ALL {
        let mut rows = Vec::new();
        for (key, record) in &output.records {
            if !belongs(category, record) {
                continue;
            }
            if let Some(row) = row_for(category, key, record, accounts, issuer) {
                rows.push(row);
            }
        }

        let (csv_path, _) =
            write_report_pair(&base, &category.file_stem(), &TTUM_HEADERS, &rows)?;
        written.push(csv_path);
    }

    tracing::info!("generated {} TTUM category files", written.len());
    Ok(written)
}

/// Read the TTUM download marker; absent means not downloaded
pub fn download_meta(paths: &RunPaths) -> DownloadMeta {
    load_json_or_default(&paths.ttum_download_meta())
}

/// Record that the TTUM files were handed to an operator
pub fn mark_downloaded(paths: &RunPaths, downloaded_by: &str) -> Result<()> {
    let meta = DownloadMeta {
        is_downloaded: true,
        downloaded_at: Some(Utc::now()),
        downloaded_by: Some(downloaded_by.to_string()),
    };
    atomic_write_json(&paths.ttum_download_meta(), &meta)?;
    tracing::info!("TTUM files marked downloaded by {}", downloaded_by);
    Ok(())
}
