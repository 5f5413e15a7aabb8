//! Atomic CSV and XLSX emission
//!
//! CSVs are built fully in memory, then handed to the core's staged
//! write (temp file in the same directory, fsync, rename). XLSX twins go
//! through rust_xlsxwriter; the workbook save is already a single write
//! of a finished file.

use crate::error::Result;
use recon_core::store::atomic_write_bytes;
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};

/// Write a CSV atomically: UTF-8 no BOM, LF terminators, no trailing comma
pub fn write_csv_atomic(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut buf);
        writer.write_record(headers)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(recon_core::Error::Io)?;
    }
    atomic_write_bytes(path, &buf)?;
    Ok(())
}

/// Write the XLSX twin of a report
pub fn write_xlsx(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            worksheet.write_string(row_idx as u32 + 1, col as u16, cell)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// Write a report as a CSV/XLSX pair under `dir`, returning both paths
pub fn write_report_pair(
    dir: &Path,
    name: &str,
    headers: &[&str],
    rows: &[Vec<String>],
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).map_err(recon_core::Error::Io)?;

    let csv_path = dir.join(format!("{}.csv", name));
    let xlsx_path = dir.join(format!("{}.xlsx", name));

    write_csv_atomic(&csv_path, headers, rows)?;
    write_xlsx(&xlsx_path, headers, rows)?;

    tracing::info!("generated {}.csv and {}.xlsx ({} rows)", name, name, rows.len());
    Ok((csv_path, xlsx_path))
}
