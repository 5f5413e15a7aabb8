//! Column normalization for heterogeneous source files
//!
//! Source systems disagree on column naming. Discovery is three-layered:
//! case-insensitive exact match against a synonym list, then substring match
//! in either direction, then the field is left unspecified. Validation fails
//! closed: a row with neither RRN nor UPI transaction ID is dropped with a
//! warning; an unparseable amount rejects the whole file.

use crate::error::{Error, Result};
use crate::types::{rrn_is_well_formed, DrCr, ResponseCode, Source, TranType, Txn};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parsed tabular input: a header row plus data rows
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Column headers as read from the file
    pub headers: Vec<String>,
    /// Data rows, one cell per header
    pub rows: Vec<Vec<String>>,
}

/// Outcome counters for one normalized file
#[derive(Debug, Clone, Default)]
pub struct NormalizerReport {
    /// Rows present in the input
    pub total_rows: usize,
    /// Rows dropped for lacking both RRN and UPI transaction ID
    pub dropped_no_key: usize,
    /// RRN values rejected for failing the 12-digit format
    pub invalid_rrns: usize,
    /// Per-row warnings
    pub warnings: Vec<String>,
}

/// A normalized file: canonical transactions plus the normalization report
#[derive(Debug, Clone)]
pub struct NormalizedFile {
    /// Canonical transactions in input order
    pub txns: Vec<Txn>,
    /// Normalization counters and warnings
    pub report: NormalizerReport,
}

const UPI_TRAN_ID_SYNONYMS: &[&str] = &[
    "upi_tran_id",
    "upi id",
    "upi_transaction_id",
    "upi_txn_id",
    "upi_txn",
    "transaction_ref",
    "transaction_ref_no",
    "customer reference number",
    "transaction_id",
    "transaction id",
];

const RRN_SYNONYMS: &[&str] = &[
    "rrn",
    "reference number",
    "ref number",
    "reference",
    "ref",
    "unique id",
    "unique_id",
    "reference_no",
    "ref_no",
    "system trace audit number",
];

const AMOUNT_SYNONYMS: &[&str] = &[
    "amount",
    "amt",
    "tran amount",
    "transaction amount",
    "tran_amt",
    "transaction_amt",
    "value",
    "amount_inr",
    "tran_value",
    "transaction_value",
    "principal",
    "principal_amount",
    "actual transaction amount",
];

const DATE_SYNONYMS: &[&str] = &[
    "date",
    "tran date",
    "transaction date",
    "tran_date",
    "transaction_date",
    "trn date",
    "trn_date",
    "dt",
    "trans_date",
    "transaction_dt",
    "date_time",
    "datetime",
    "tran_datetime",
    "transaction_datetime",
    "card acceptor settl date",
];

const TIME_SYNONYMS: &[&str] = &[
    "time",
    "tran time",
    "transaction time",
    "tran_time",
    "transaction_time",
    "trn time",
    "trn_time",
];

const DR_CR_SYNONYMS: &[&str] = &[
    "dr_cr",
    "d/c",
    "dr/cr",
    "debit_credit",
    "debit/credit",
    "credit_debit",
    "c/d",
    "cd",
];

const RC_SYNONYMS: &[&str] = &[
    "rc",
    "rcode",
    "response code",
    "response_code",
    "status_code",
    "response",
    "rcode_val",
    "response_val",
    "error_code",
];

const TRAN_TYPE_SYNONYMS: &[&str] = &[
    "tran type",
    "transaction type",
    "tran_type",
    "transaction_type",
    "payment type",
    "payment_type",
    "transaction_mode",
    "payment_mode",
    "service",
    "service_type",
];

const PAYER_PSP_SYNONYMS: &[&str] = &[
    "payer psp",
    "payer_psp",
    "payer psp code",
    "remitter psp",
    "payer_code",
];

const PAYEE_PSP_SYNONYMS: &[&str] = &[
    "payee psp",
    "payee_psp",
    "payee psp code",
    "beneficiary psp",
    "payee_code",
];

const MCC_SYNONYMS: &[&str] = &["mcc", "merchant category code"];

const CHANNEL_SYNONYMS: &[&str] = &[
    "originating channel",
    "channel",
    "otp indicator",
    "originating_channel",
];

/// Find a column index for a canonical field.
///
/// Layer 1: case-insensitive exact match. Layer 2: substring match in either
/// direction. No match means the field stays unspecified.
pub fn find_column(headers: &[String], synonyms: &[&str]) -> Option<usize> {
    for (idx, header) in headers.iter().enumerate() {
        let h = header.trim().to_ascii_lowercase();
        if synonyms.iter().any(|s| *s == h) {
            return Some(idx);
        }
    }
    for (idx, header) in headers.iter().enumerate() {
        let h = header.trim().to_ascii_lowercase();
        if h.is_empty() {
            continue;
        }
        if synonyms.iter().any(|s| h.contains(s) || s.contains(&*h)) {
            return Some(idx);
        }
    }
    None
}

/// Parse an amount cell: commas stripped, two fractional digits
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    let amount = Decimal::from_str(&cleaned).ok()?;
    Some(amount.round_dp(2))
}

/// Parse a date cell, splitting out an embedded time when present.
///
/// Accepts ISO-8601 with `T` or space, `YYYY-MM-DD`, and `DD-MM-YYYY`.
pub fn parse_date_time(raw: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
    let trimmed = raw.trim().trim_end_matches('Z');
    if trimmed.is_empty() {
        return None;
    }
    let unified = trimmed.replace('T', " ");
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&unified, fmt) {
            return Some((dt.date(), Some(dt.time())));
        }
    }
    for fmt in ["%Y-%m-%d", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some((d, None));
        }
    }
    None
}

/// Parse a standalone time cell
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in ["%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(trimmed, fmt) {
            return Some(t);
        }
    }
    None
}

/// Normalize a debit/credit cell: uppercase, non-letters stripped
pub fn parse_dr_cr(raw: &str) -> DrCr {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    match cleaned.as_str() {
        "D" | "DR" | "DEBIT" => DrCr::Debit,
        "C" | "CR" | "CREDIT" => DrCr::Credit,
        _ => DrCr::Unspecified,
    }
}

fn cell<'a>(row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Normalize one parsed table into canonical transactions.
///
/// `file_name` is used only for error and warning context.
pub fn normalize_table(table: &RawTable, source: Source, file_name: &str) -> Result<NormalizedFile> {
    let headers = &table.headers;

    let upi_idx = find_column(headers, UPI_TRAN_ID_SYNONYMS);
    let rrn_idx = find_column(headers, RRN_SYNONYMS);
    let amount_idx = find_column(headers, AMOUNT_SYNONYMS).ok_or_else(|| Error::MissingColumn {
        file: file_name.to_string(),
        column: "Amount".to_string(),
    })?;
    let date_idx = find_column(headers, DATE_SYNONYMS).ok_or_else(|| Error::MissingColumn {
        file: file_name.to_string(),
        column: "Tran_Date".to_string(),
    })?;
    let time_idx = find_column(headers, TIME_SYNONYMS);
    let dr_cr_idx = find_column(headers, DR_CR_SYNONYMS);
    let rc_idx = find_column(headers, RC_SYNONYMS);
    let tran_type_idx = find_column(headers, TRAN_TYPE_SYNONYMS);
    let payer_idx = find_column(headers, PAYER_PSP_SYNONYMS);
    let payee_idx = find_column(headers, PAYEE_PSP_SYNONYMS);
    let mcc_idx = find_column(headers, MCC_SYNONYMS);
    let channel_idx = find_column(headers, CHANNEL_SYNONYMS);

    if rrn_idx.is_none() && upi_idx.is_none() {
        return Err(Error::MissingColumn {
            file: file_name.to_string(),
            column: "RRN".to_string(),
        });
    }

    let mut report = NormalizerReport {
        total_rows: table.rows.len(),
        ..Default::default()
    };
    let mut txns = Vec::with_capacity(table.rows.len());

    for (row_no, row) in table.rows.iter().enumerate() {
        let raw_amount = cell(row, Some(amount_idx)).unwrap_or("");
        let amount = parse_amount(raw_amount).ok_or_else(|| Error::AmountParse {
            file: file_name.to_string(),
            row: row_no,
            value: raw_amount.to_string(),
        })?;

        let raw_date = cell(row, Some(date_idx)).unwrap_or("");
        let (tran_date, embedded_time) =
            parse_date_time(raw_date).ok_or_else(|| Error::DateParse {
                file: file_name.to_string(),
                row: row_no,
                value: raw_date.to_string(),
            })?;

        let tran_time = cell(row, time_idx).and_then(parse_time).or(embedded_time);

        let mut rrn = cell(row, rrn_idx).map(|s| s.to_string());
        let malformed = rrn
            .as_deref()
            .map(|value| !rrn_is_well_formed(value))
            .unwrap_or(false);
        if malformed {
            let value = rrn.take().unwrap_or_default();
            report.invalid_rrns += 1;
            report
                .warnings
                .push(format!("row {}: malformed RRN '{}' rejected", row_no, value));
        }
        let upi_tran_id = cell(row, upi_idx).map(|s| s.to_string());

        if rrn.is_none() && upi_tran_id.is_none() {
            report.dropped_no_key += 1;
            tracing::warn!(
                "{} row {}: no RRN or UPI transaction ID, dropping row",
                file_name,
                row_no
            );
            continue;
        }

        let tran_type = match cell(row, tran_type_idx) {
            Some(raw) => split_tran_type(raw),
            None => TranType::default(),
        };

        txns.push(Txn {
            upi_tran_id,
            rrn,
            amount,
            tran_date,
            tran_time,
            dr_cr: cell(row, dr_cr_idx).map(parse_dr_cr).unwrap_or(DrCr::Unspecified),
            rc: cell(row, rc_idx)
                .map(ResponseCode::parse)
                .unwrap_or(ResponseCode::Unspecified),
            tran_type,
            payer_psp: cell(row, payer_idx).map(|s| s.to_string()),
            payee_psp: cell(row, payee_idx).map(|s| s.to_string()),
            mcc: cell(row, mcc_idx).map(|s| s.to_string()),
            channel: cell(row, channel_idx).map(|s| s.to_string()),
            source,
        });
    }

    tracing::debug!(
        "{}: normalized {} of {} rows ({} dropped)",
        file_name,
        txns.len(),
        report.total_rows,
        report.dropped_no_key
    );

    Ok(NormalizedFile { txns, report })
}

fn split_tran_type(raw: &str) -> TranType {
    let upper = raw.trim().to_ascii_uppercase();
    let mut network = None;
    let mut subtype = None;
    for token in upper.split_whitespace() {
        if token == "P2P" || token == "P2M" {
            subtype = Some(token.to_string());
        } else {
            network.get_or_insert_with(|| token.to_string());
        }
    }
    if network.is_none() && subtype.is_none() && !upper.is_empty() {
        network = Some(upper);
    }
    TranType { network, subtype }
}
