//! GL account selection for TTUM instructions
//!
//! Debit/credit accounts per TTUM row come from the static account map,
//! keyed by category and direction, with a per-RRN issuer-action override
//! loaded at startup.

use recon_core::config::GlAccounts;
use recon_core::store::load_json_or_default;
use recon_core::types::{Direction, DrCr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// TTUM file categories, one output file per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtumCategory {
    /// Debit reversal confirmation
    Drc,
    /// Manual reconciliation
    Rrc,
    /// Transaction credit confirmation
    Tcc,
    /// Return
    Ret,
    /// Recovery from the remitter or beneficiary
    Recovery,
    /// Remitter refund
    Refund,
}

impl TtumCategory {
    /// All categories in emission order
    pub const ALL: [TtumCategory; 6] = [
        TtumCategory::Drc,
        TtumCategory::Rrc,
        TtumCategory::Tcc,
        TtumCategory::Ret,
        TtumCategory::Recovery,
        TtumCategory::Refund,
    ];

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TtumCategory::Drc => "DRC",
            TtumCategory::Rrc => "RRC",
            TtumCategory::Tcc => "TCC",
            TtumCategory::Ret => "RET",
            TtumCategory::Recovery => "RECOVERY",
            TtumCategory::Refund => "REFUND",
        }
    }

    /// Lowercase file stem (`drc.csv`, `refund.xlsx`, ...)
    pub fn file_stem(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl fmt::Display for TtumCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Issuer-directed override for one RRN
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuerAction {
    /// Action label from the issuer file (e.g. "Refund", "Recovery")
    pub action_point: String,

    /// Outward payable GL the issuer designates, when present
    pub outward_payable: Option<String>,
}

/// Per-RRN issuer action map loaded at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuerActions {
    /// RRN to directed action
    #[serde(default)]
    pub actions: HashMap<String, IssuerAction>,
}

impl IssuerActions {
    /// Load the map from a JSON file; missing or corrupt files are empty
    pub fn load(path: &Path) -> Self {
        let actions: IssuerActions = load_json_or_default(path);
        if !actions.actions.is_empty() {
            tracing::info!(
                "loaded {} issuer actions from {}",
                actions.actions.len(),
                path.display()
            );
        }
        actions
    }

    /// Override for an RRN, when the issuer directed one
    pub fn get(&self, rrn: &str) -> Option<&IssuerAction> {
        self.actions.get(rrn)
    }
}

/// Select the (debit, credit) GL account codes for one TTUM row.
///
/// The static map keys on category and the row's debit/credit side; an
/// issuer action whose label matches the category redirects the credit
/// account to the issuer's outward payable GL.
pub fn ttum_gl_accounts(
    category: TtumCategory,
    direction: Direction,
    dr_cr: DrCr,
    accounts: &GlAccounts,
    issuer: Option<&IssuerAction>,
) -> (String, String) {
    let (debit, mut credit) = match category {
        TtumCategory::Refund => (
            accounts.settlement_payable.code.clone(),
            accounts.bank_account.code.clone(),
        ),
        TtumCategory::Recovery => (
            accounts.bank_account.code.clone(),
            accounts.settlement_receivable.code.clone(),
        ),
        TtumCategory::Tcc => (
            accounts.suspense_account.code.clone(),
            accounts.settlement_payable.code.clone(),
        ),
        TtumCategory::Drc | TtumCategory::Rrc => {
            if dr_cr.is_debit() {
                (
                    accounts.settlement_payable.code.clone(),
                    accounts.suspense_account.code.clone(),
                )
            } else {
                (
                    accounts.suspense_account.code.clone(),
                    accounts.settlement_payable.code.clone(),
                )
            }
        }
        TtumCategory::Ret => match direction {
            Direction::Outward => (
                accounts.settlement_payable.code.clone(),
                accounts.suspense_account.code.clone(),
            ),
            Direction::Inward => (
                accounts.suspense_account.code.clone(),
                accounts.settlement_payable.code.clone(),
            ),
        },
    };

    if let Some(action) = issuer {
        let label = action.action_point.to_ascii_lowercase();
        let applies = match category {
            TtumCategory::Refund => label.contains("refund"),
            TtumCategory::Recovery => label.contains("recovery"),
            _ => false,
        };
        if applies {
            if let Some(gl) = action.outward_payable.as_deref().filter(|g| !g.trim().is_empty()) {
                credit = gl.trim().to_string();
            }
        }
    }

    (debit, credit)
}
