//! Exception decision matrix
//!
//! Maps the (CBS, Switch, NPCI) status tuple and the transaction direction
//! to a concrete corrective action. The dense default table covers the
//! combinations the network functional specification enumerates; unknown
//! tuples stay unmapped and the engine records them for matrix expansion.

use recon_core::config::MatrixRule;
use recon_core::types::Direction;
use std::collections::BTreeMap;
use std::fmt;

/// Per-source success indicator fed into the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceStatus {
    /// The source recorded the transaction as successful
    Success,
    /// The source declined the transaction or never saw it
    Failed,
}

impl SourceStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "S" => Some(SourceStatus::Success),
            "FAILED" | "FAIL" | "F" => Some(SourceStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::Success => write!(f, "SUCCESS"),
            SourceStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Concrete action produced by the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixAction {
    /// All three sources reconcile cleanly
    Matched,
    /// Inward deemed success: TCC 102 when NPCI answered RB
    ConditionalTcc102,
    /// Outward failure after debit: refund the remitter
    RemitterRefundTtum,
    /// Inward credit without CBS posting: recover from the beneficiary
    BeneficiaryRecoveryTtum,
    /// Switch missed an otherwise-successful transaction
    SwitchUpdate,
    /// Switch update plus a conditional TCC 102
    ConditionalTcc102SwitchUpdate,
    /// Outward success without CBS debit: recover from the remitter
    RemitterRecoveryTtum,
    /// Inward network success with no bank posting: credit + TCC 103
    BeneficiaryCreditTtumTcc103,
    /// No corrective action; leave unmatched
    Unmatched,
}

impl MatrixAction {
    /// Parse an action name from configuration
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MATCHED" => Some(MatrixAction::Matched),
            "CONDITIONAL_TCC_102" => Some(MatrixAction::ConditionalTcc102),
            "REMITTER_REFUND_TTUM" => Some(MatrixAction::RemitterRefundTtum),
            "BENEFICIARY_RECOVERY_TTUM" => Some(MatrixAction::BeneficiaryRecoveryTtum),
            "SWITCH_UPDATE" => Some(MatrixAction::SwitchUpdate),
            "CONDITIONAL_TCC_102_SWITCH_UPDATE" => Some(MatrixAction::ConditionalTcc102SwitchUpdate),
            "REMITTER_RECOVERY_TTUM" => Some(MatrixAction::RemitterRecoveryTtum),
            "BENEFICIARY_CREDIT_TTUM_TCC_103" => Some(MatrixAction::BeneficiaryCreditTtumTcc103),
            "UNMATCHED" => Some(MatrixAction::Unmatched),
            _ => None,
        }
    }
}

/// The decision matrix: dense defaults plus configuration overrides
#[derive(Debug, Default)]
pub struct ExceptionMatrix {
    overrides: BTreeMap<(String, Direction), MatrixAction>,
}

impl ExceptionMatrix {
    /// Build the matrix, folding in configured tuple overrides.
    ///
    /// Override keys use the `CBS_SWITCH_NPCI` form, e.g.
    /// `SUCCESS_FAILED_SUCCESS`. Unparseable keys or action names are
    /// skipped with a warning.
    pub fn from_config(rules: &BTreeMap<String, MatrixRule>) -> Self {
        let mut overrides = BTreeMap::new();
        for (key, rule) in rules {
            let parts: Vec<&str> = key.split('_').collect();
            let tuple_ok = parts.len() == 3
                && parts.iter().all(|p| SourceStatus::parse(p).is_some());
            if !tuple_ok {
                tracing::warn!("ignoring malformed exception-matrix key '{}'", key);
                continue;
            }
            let canonical = key.trim().to_ascii_uppercase();
            match MatrixAction::parse(&rule.inward_action) {
                Some(action) => {
                    overrides.insert((canonical.clone(), Direction::Inward), action);
                }
                None => tracing::warn!(
                    "ignoring unknown inward action '{}' for '{}'",
                    rule.inward_action,
                    key
                ),
            }
            match MatrixAction::parse(&rule.outward_action) {
                Some(action) => {
                    overrides.insert((canonical, Direction::Outward), action);
                }
                None => tracing::warn!(
                    "ignoring unknown outward action '{}' for '{}'",
                    rule.outward_action,
                    key
                ),
            }
        }
        Self { overrides }
    }

    /// Resolve the action for a tuple. `None` means no rule covers it.
    pub fn action(
        &self,
        cbs: SourceStatus,
        switch: SourceStatus,
        npci: SourceStatus,
        direction: Direction,
    ) -> Option<MatrixAction> {
        let key = format!("{}_{}_{}", cbs, switch, npci);
        if let Some(action) = self.overrides.get(&(key, direction)) {
            return Some(*action);
        }
        default_action(cbs, switch, npci, direction)
    }
}

/// The dense default table from the network functional specification
fn default_action(
    cbs: SourceStatus,
    switch: SourceStatus,
    npci: SourceStatus,
    direction: Direction,
) -> Option<MatrixAction> {
    use Direction::{Inward, Outward};
    use SourceStatus::{Failed, Success};

    match (cbs, switch, npci, direction) {
        (Success, Success, Success, _) => Some(MatrixAction::Matched),
        (Success, Success, Failed, Inward) => Some(MatrixAction::ConditionalTcc102),
        (Success, Success, Failed, Outward) => Some(MatrixAction::RemitterRefundTtum),
        (Failed, Success, Success, Inward) => Some(MatrixAction::BeneficiaryRecoveryTtum),
        (Failed, Success, Success, Outward) => Some(MatrixAction::RemitterRecoveryTtum),
        (Success, Failed, Success, Inward) => Some(MatrixAction::ConditionalTcc102SwitchUpdate),
        (Success, Failed, Success, Outward) => Some(MatrixAction::SwitchUpdate),
        (Failed, Failed, Success, Inward) => Some(MatrixAction::BeneficiaryCreditTtumTcc103),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_examples() {
        let matrix = ExceptionMatrix::default();
        use Direction::{Inward, Outward};
        use SourceStatus::{Failed, Success};

        assert_eq!(
            matrix.action(Success, Success, Success, Inward),
            Some(MatrixAction::Matched)
        );
        assert_eq!(
            matrix.action(Success, Success, Failed, Inward),
            Some(MatrixAction::ConditionalTcc102)
        );
        assert_eq!(
            matrix.action(Success, Success, Failed, Outward),
            Some(MatrixAction::RemitterRefundTtum)
        );
        assert_eq!(
            matrix.action(Failed, Success, Success, Inward),
            Some(MatrixAction::BeneficiaryRecoveryTtum)
        );
        assert_eq!(
            matrix.action(Success, Failed, Success, Outward),
            Some(MatrixAction::SwitchUpdate)
        );
        assert_eq!(
            matrix.action(Failed, Failed, Success, Inward),
            Some(MatrixAction::BeneficiaryCreditTtumTcc103)
        );
        // Unknown tuple stays unmapped
        assert_eq!(matrix.action(Failed, Failed, Failed, Inward), None);
    }

    #[test]
    fn test_config_override_wins() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "SUCCESS_SUCCESS_FAILED".to_string(),
            MatrixRule {
                inward_action: "UNMATCHED".to_string(),
                outward_action: "REMITTER_REFUND_TTUM".to_string(),
            },
        );
        let matrix = ExceptionMatrix::from_config(&rules);

        assert_eq!(
            matrix.action(
                SourceStatus::Success,
                SourceStatus::Success,
                SourceStatus::Failed,
                Direction::Inward
            ),
            Some(MatrixAction::Unmatched)
        );
        // Direction not overridden falls back to the default
        assert_eq!(
            matrix.action(
                SourceStatus::Success,
                SourceStatus::Success,
                SourceStatus::Failed,
                Direction::Outward
            ),
            Some(MatrixAction::RemitterRefundTtum)
        );
    }

    #[test]
    fn test_malformed_override_ignored() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "NOT_A_TUPLE".to_string(),
            MatrixRule {
                inward_action: "MATCHED".to_string(),
                outward_action: "MATCHED".to_string(),
            },
        );
        let matrix = ExceptionMatrix::from_config(&rules);
        assert!(matrix.overrides.is_empty());
    }
}
