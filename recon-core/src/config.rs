//! Configuration for the reconciliation rail

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Rail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory uploaded source files live under, one folder per run
    pub upload_dir: PathBuf,

    /// Directory all run output trees live under
    pub output_dir: PathBuf,

    /// Three-way matching configurations, tightest first
    pub matching: Vec<MatchingConfig>,

    /// GL account map for voucher and TTUM generation
    pub gl_accounts: GlAccounts,

    /// Exception-matrix overrides keyed by `CBS_SWITCH_NPCI` status tuple
    pub exception_matrix: BTreeMap<String, MatrixRule>,

    /// Daily audit log entries before the file is sealed and rotated
    pub max_audit_entries_per_file: usize,

    /// How long a rollback waits on the lock before reporting busy
    pub rollback_lock_timeout_ms: u64,

    /// Amount comparison tolerance
    pub amount_epsilon: Decimal,

    /// Date comparison tolerance in days (relaxed mode)
    pub date_tolerance_days: i64,

    /// Cut-off hour: NPCI rows at or past this time go hanging
    pub cut_off_hour: u32,

    /// Cut-off minute
    pub cut_off_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./data/uploads"),
            output_dir: PathBuf::from("./data/output"),
            matching: MatchingConfig::defaults(),
            gl_accounts: GlAccounts::default(),
            exception_matrix: BTreeMap::new(),
            max_audit_entries_per_file: 10_000,
            rollback_lock_timeout_ms: 0, // non-blocking: fail fast on contention
            amount_epsilon: Decimal::new(1, 2), // 0.01
            date_tolerance_days: 1,
            cut_off_hour: 22,
            cut_off_minute: 30,
        }
    }
}

impl Config {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load defaults overridden by environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("RECON_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("RECON_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Cut-off time as a wall-clock value
    pub fn cut_off_time(&self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.cut_off_hour, self.cut_off_minute, 0)
            .unwrap_or_else(|| chrono::NaiveTime::from_hms_opt(22, 30, 0).expect("static time"))
    }
}

/// One matching round: the fields that must agree for a three-way match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Human-readable name (surfaces in logs)
    pub name: String,

    /// Fields that must be present on the NPCI row for this round to apply
    pub required_fields: Vec<String>,

    /// Fields compared across CBS, Switch, and NPCI
    pub params: Vec<String>,
}

impl MatchingConfig {
    /// The fixed tightest-to-loosest ordering
    pub fn defaults() -> Vec<MatchingConfig> {
        vec![
            MatchingConfig {
                name: "exact_match".to_string(),
                required_fields: vec![
                    "RRN".to_string(),
                    "Amount".to_string(),
                    "Tran_Date".to_string(),
                    "UPI_Tran_ID".to_string(),
                ],
                params: vec![
                    "RRN".to_string(),
                    "Amount".to_string(),
                    "Tran_Date".to_string(),
                    "UPI_Tran_ID".to_string(),
                ],
            },
            MatchingConfig {
                name: "rrn_amount_date".to_string(),
                required_fields: vec![
                    "RRN".to_string(),
                    "Amount".to_string(),
                    "Tran_Date".to_string(),
                ],
                params: vec![
                    "RRN".to_string(),
                    "Amount".to_string(),
                    "Tran_Date".to_string(),
                ],
            },
            MatchingConfig {
                name: "upi_amount_date".to_string(),
                required_fields: vec![
                    "UPI_Tran_ID".to_string(),
                    "Amount".to_string(),
                    "Tran_Date".to_string(),
                ],
                params: vec![
                    "UPI_Tran_ID".to_string(),
                    "Amount".to_string(),
                    "Tran_Date".to_string(),
                ],
            },
        ]
    }
}

/// Exception-matrix rule: the action to take per direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixRule {
    /// Action name applied to inward transactions
    pub inward_action: String,

    /// Action name applied to outward transactions
    pub outward_action: String,
}

/// A single GL account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlAccount {
    /// Ledger account code
    pub code: String,

    /// Display name
    pub name: String,
}

impl GlAccount {
    fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// GL account map used by voucher and TTUM generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlAccounts {
    /// Cash in hand
    pub cash_account: GlAccount,
    /// Bank operating account
    pub bank_account: GlAccount,
    /// Suspense parking account for unmatched items
    pub suspense_account: GlAccount,
    /// Transaction fee income
    pub fee_income: GlAccount,
    /// Transaction fee expense
    pub fee_expense: GlAccount,
    /// Settlement payable to the network
    pub settlement_payable: GlAccount,
    /// Settlement receivable from the network
    pub settlement_receivable: GlAccount,
}

impl Default for GlAccounts {
    fn default() -> Self {
        Self {
            cash_account: GlAccount::new("100100", "Cash in Hand"),
            bank_account: GlAccount::new("100200", "Bank Account"),
            suspense_account: GlAccount::new("200100", "Suspense Account"),
            fee_income: GlAccount::new("400100", "Transaction Fee Income"),
            fee_expense: GlAccount::new("500100", "Transaction Fee Expense"),
            settlement_payable: GlAccount::new("200200", "Settlement Payable"),
            settlement_receivable: GlAccount::new("100300", "Settlement Receivable"),
        }
    }
}
