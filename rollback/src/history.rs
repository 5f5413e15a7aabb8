//! Rollback history ledger
//!
//! `rollback_history.json` lives at the output root, shared across runs.
//! Records carry operator-friendly IDs (`RB_<LEVEL>_<SEQ>_<MMDD>`) and a
//! monotone status lifecycle: PENDING -> IN_PROGRESS -> COMPLETED|FAILED,
//! never backwards.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use recon_core::store::{atomic_write_json, load_json_or_default};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Rollback operation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackLevel {
    /// Complete process rollback
    WholeProcess,
    /// File ingestion rollback
    Ingestion,
    /// Mid-reconciliation rollback
    MidRecon,
    /// Specific settlement cycle
    CycleWise,
    /// Accounting/voucher rollback
    Accounting,
}

impl RollbackLevel {
    /// Short code used in rollback IDs
    pub fn short(&self) -> &'static str {
        match self {
            RollbackLevel::WholeProcess => "FULL",
            RollbackLevel::Ingestion => "ING",
            RollbackLevel::MidRecon => "MID",
            RollbackLevel::CycleWise => "CYC",
            RollbackLevel::Accounting => "ACC",
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackLevel::WholeProcess => "whole_process",
            RollbackLevel::Ingestion => "ingestion",
            RollbackLevel::MidRecon => "mid_recon",
            RollbackLevel::CycleWise => "cycle_wise",
            RollbackLevel::Accounting => "accounting",
        }
    }
}

impl fmt::Display for RollbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a rollback operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Logged, not yet running
    Pending,
    /// Mutations underway
    InProgress,
    /// Ran to completion
    Completed,
    /// Aborted; the backup survives
    Failed,
}

impl RollbackStatus {
    fn rank(&self) -> u8 {
        match self {
            RollbackStatus::Pending => 0,
            RollbackStatus::InProgress => 1,
            RollbackStatus::Completed | RollbackStatus::Failed => 2,
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackStatus::Pending => "pending",
            RollbackStatus::InProgress => "in_progress",
            RollbackStatus::Completed => "completed",
            RollbackStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in the rollback ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Operator-friendly identifier
    pub rollback_id: String,

    /// Level that ran
    pub level: RollbackLevel,

    /// Run the operation targeted
    pub run_id: String,

    /// When the operation was logged
    pub timestamp: DateTime<Utc>,

    /// Current lifecycle status
    pub status: RollbackStatus,

    /// Last status change
    pub updated_at: Option<DateTime<Utc>>,

    /// Structured operation details
    pub details: Value,
}

/// File-backed rollback ledger
#[derive(Debug, Clone)]
pub struct RollbackHistory {
    path: PathBuf,
}

impl RollbackHistory {
    /// Bind the ledger to its `rollback_history.json` path, creating an
    /// empty file when absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            atomic_write_json(&path, &Vec::<RollbackRecord>::new())
                .map_err(Error::Core)?;
        }
        Ok(Self { path })
    }

    /// All records, oldest first
    pub fn load(&self) -> Vec<RollbackRecord> {
        load_json_or_default(&self.path)
    }

    /// Records for one run
    pub fn for_run(&self, run_id: &str) -> Vec<RollbackRecord> {
        self.load()
            .into_iter()
            .filter(|r| r.run_id == run_id)
            .collect()
    }

    /// Log a new PENDING operation and return its rollback ID
    pub fn append(&self, level: RollbackLevel, run_id: &str, details: Value) -> Result<String> {
        let mut records = self.load();

        let sequential = records.iter().filter(|r| r.level == level).count() + 1;
        let rollback_id = format!(
            "RB_{}_{:03}_{}",
            level.short(),
            sequential,
            Utc::now().format("%m%d")
        );

        records.push(RollbackRecord {
            rollback_id: rollback_id.clone(),
            level,
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            status: RollbackStatus::Pending,
            updated_at: None,
            details,
        });
        atomic_write_json(&self.path, &records).map_err(Error::Core)?;

        tracing::info!("logged rollback {} ({}) for run {}", rollback_id, level, run_id);
        Ok(rollback_id)
    }

    /// Advance a record's status. Reverse transitions are rejected.
    pub fn update_status(&self, rollback_id: &str, status: RollbackStatus) -> Result<()> {
        let mut records = self.load();
        let record = records
            .iter_mut()
            .find(|r| r.rollback_id == rollback_id)
            .ok_or_else(|| Error::NotFound(format!("rollback {}", rollback_id)))?;

        if status.rank() <= record.status.rank() {
            return Err(Error::IllegalTransition {
                rollback_id: rollback_id.to_string(),
                from: record.status.to_string(),
                to: status.to_string(),
            });
        }

        record.status = status;
        record.updated_at = Some(Utc::now());
        atomic_write_json(&self.path, &records).map_err(Error::Core)?;
        Ok(())
    }

    /// True when any record for the run is still IN_PROGRESS
    pub fn in_progress(&self, run_id: &str) -> bool {
        self.for_run(run_id)
            .iter()
            .any(|r| r.status == RollbackStatus::InProgress)
    }
}
