//! Tabular file readers and filename-convention validation
//!
//! CSV and XLSX sources both reduce to a [`RawTable`] before normalization.
//! NPCI and DRC files additionally carry a strict filename convention that
//! encodes direction, transaction type, bank code, date, and cycle.

use crate::error::{Error, Result};
use crate::normalize::RawTable;
use crate::types::Direction;
use calamine::{open_workbook_auto, Reader};
use chrono::NaiveDate;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Read a CSV file into a raw table
pub fn read_csv_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::UnreadableFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let headers = reader
        .headers()
        .map_err(|e| Error::UnreadableFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::UnreadableFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(RawTable { headers, rows })
}

/// Read CSV content already in memory (tests and API adapters)
pub fn read_csv_str(data: &str) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| Error::UnreadableFile {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::UnreadableFile {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(RawTable { headers, rows })
}

/// Read the first worksheet of an XLSX/XLS file into a raw table
pub fn read_xlsx_table(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| Error::UnreadableFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names.first().ok_or_else(|| Error::UnreadableFile {
        path: path.display().to_string(),
        reason: "workbook contains no sheets".to_string(),
    })?;

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| Error::UnreadableFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut rows_iter = range.rows();
    let headers = match rows_iter.next() {
        Some(row) => row.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => Vec::new(),
    };

    let rows = rows_iter
        .map(|row| row.iter().map(|c| c.to_string().trim().to_string()).collect())
        .collect();

    Ok(RawTable { headers, rows })
}

/// Metadata encoded in an NPCI raw-file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpciFilename {
    /// ISSR maps to inward, ACQR to outward
    pub direction: Direction,
    /// P2P or P2M
    pub txn_type: String,
    /// Four-character bank code
    pub bank_code: String,
    /// File date from the DDMMYY segment
    pub file_date: Option<NaiveDate>,
    /// Settlement cycle (`1C`..`10C`), when present
    pub cycle: Option<String>,
}

fn npci_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Example: ISSRP2PPYBP130725_1C
        Regex::new(r"(?i)^(ISSR|ACQR)(P2P|P2M)([A-Z0-9]{4})(\d{6})(?:[_-]?(\d{1,2})C)?$")
            .expect("static regex")
    })
}

fn drc_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^DRCREPORT([A-Z0-9]{4})(\d{6})").expect("static regex"))
}

fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if ext.eq_ignore_ascii_case("csv")
                || ext.eq_ignore_ascii_case("xlsx")
                || ext.eq_ignore_ascii_case("xls") =>
        {
            stem
        }
        _ => filename,
    }
}

/// Parse an NPCI raw-file name, or None when the convention does not hold
pub fn parse_npci_filename(filename: &str) -> Option<NpciFilename> {
    let stem = strip_extension(filename);
    let caps = npci_filename_re().captures(stem)?;

    let direction = if caps[1].eq_ignore_ascii_case("ISSR") {
        Direction::Inward
    } else {
        Direction::Outward
    };

    let cycle = match caps.get(5) {
        Some(n) => {
            let num: u32 = n.as_str().parse().ok()?;
            if !(1..=10).contains(&num) {
                return None;
            }
            Some(format!("{}C", num))
        }
        None => None,
    };

    Some(NpciFilename {
        direction,
        txn_type: caps[2].to_ascii_uppercase(),
        bank_code: caps[3].to_ascii_uppercase(),
        file_date: NaiveDate::parse_from_str(&caps[4], "%d%m%y").ok(),
        cycle,
    })
}

/// True when a filename follows the DRC report convention
pub fn is_drc_filename(filename: &str) -> bool {
    drc_filename_re().is_match(strip_extension(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_round_trip() {
        let table = read_csv_str("RRN,Amount\n123456789012,150.00\n").unwrap();
        assert_eq!(table.headers, vec!["RRN", "Amount"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][1], "150.00");
    }

    #[test]
    fn test_npci_filename_parsing() {
        let parsed = parse_npci_filename("ISSRP2PPYBP130725_1C.csv").unwrap();
        assert_eq!(parsed.direction, Direction::Inward);
        assert_eq!(parsed.txn_type, "P2P");
        assert_eq!(parsed.bank_code, "PYBP");
        assert_eq!(parsed.cycle.as_deref(), Some("1C"));
        assert_eq!(
            parsed.file_date,
            NaiveDate::from_ymd_opt(2025, 7, 13)
        );

        let acqr = parse_npci_filename("ACQRP2MPYBP130725_10C.xlsx").unwrap();
        assert_eq!(acqr.direction, Direction::Outward);
        assert_eq!(acqr.cycle.as_deref(), Some("10C"));
    }

    #[test]
    fn test_npci_filename_rejects_bad_cycle() {
        assert!(parse_npci_filename("ISSRP2PPYBP130725_11C.csv").is_none());
        assert!(parse_npci_filename("NOTAFILE.csv").is_none());
    }

    #[test]
    fn test_drc_filename() {
        assert!(is_drc_filename("DRCREPORTPYBP130725.csv"));
        assert!(!is_drc_filename("REPORTPYBP130725.csv"));
    }
}
