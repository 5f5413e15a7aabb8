//! Append-only audit trail with daily rotation
//!
//! Every operator-visible action lands here. Entries are never edited or
//! deleted; the one permitted in-place mutation is flipping `resolved` to
//! true through [`AuditTrail::resolve`]. Files rotate by date, and a daily
//! file that exceeds the configured entry threshold is sealed with a
//! timestamp suffix before a fresh file is started.

use crate::error::Result;
use crate::store::{atomic_write_json, load_json_or_default};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Types of auditable actions in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A source file was uploaded into a run
    FileUploaded,
    /// A source file passed validation
    FileValidated,
    /// A source file failed validation
    FileRejected,
    /// A reconciliation cycle started
    ReconStarted,
    /// A reconciliation cycle finished
    ReconCompleted,
    /// A reconciliation cycle aborted
    ReconFailed,
    /// One settlement cycle was processed
    CycleProcessed,
    /// A rollback was requested
    RollbackInitiated,
    /// A rollback ran to completion
    RollbackCompleted,
    /// A rollback failed
    RollbackFailed,
    /// An operator force-match was requested
    ForceMatchInitiated,
    /// An operator force-match completed
    ForceMatchCompleted,
    /// An exception was recorded
    ExceptionLogged,
    /// An exception was marked resolved
    ExceptionResolved,
    /// Output artefacts were exported
    DataExported,
    /// Output artefacts were deleted
    DataDeleted,
    /// Configuration changed
    ConfigChanged,
    /// Unexpected system error
    SystemError,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Audit severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    /// Routine action
    Info,
    /// Noteworthy but non-fatal
    Warning,
    /// Operation failed
    Error,
    /// Compliance-critical failure
    Critical,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier
    pub audit_id: String,

    /// Action performed
    pub action: AuditAction,

    /// Run the action belongs to
    pub run_id: String,

    /// Acting user; `SYSTEM` when unattended
    pub user_id: String,

    /// Severity
    pub level: AuditLevel,

    /// When the action happened
    pub timestamp: DateTime<Utc>,

    /// Structured context
    pub details: Value,

    /// System that initiated the action
    pub source_system: String,

    /// Set via [`AuditTrail::resolve`]; never unset
    #[serde(default)]
    pub resolved: bool,
}

/// Append-only audit trail manager
pub struct AuditTrail {
    log_dir: PathBuf,
    max_entries_per_file: usize,
    entries: Mutex<Vec<AuditEntry>>,
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditTrail")
            .field("log_dir", &self.log_dir)
            .field("max_entries_per_file", &self.max_entries_per_file)
            .finish()
    }
}

impl AuditTrail {
    /// Open the trail under `log_dir`, loading any existing daily files
    pub fn open(log_dir: impl Into<PathBuf>, max_entries_per_file: usize) -> Result<Self> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)?;

        let mut entries = Vec::new();
        let mut names: Vec<PathBuf> = fs::read_dir(&log_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        names.sort();
        for path in names {
            let loaded: Vec<AuditEntry> = load_json_or_default(&path);
            entries.extend(loaded);
        }

        tracing::debug!(
            "audit trail opened with {} existing entries under {}",
            entries.len(),
            log_dir.display()
        );

        Ok(Self {
            log_dir,
            max_entries_per_file,
            entries: Mutex::new(entries),
        })
    }

    fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.log_dir
            .join(format!("audit_trail_{}.json", date.format("%Y%m%d")))
    }

    /// Append an action to the trail
    pub fn log_action(
        &self,
        action: AuditAction,
        run_id: &str,
        user_id: Option<&str>,
        level: AuditLevel,
        details: Value,
        source_system: &str,
    ) -> Result<AuditEntry> {
        let now = Utc::now();
        let entry = AuditEntry {
            audit_id: format!(
                "AUD_{}_{}",
                now.format("%Y%m%d%H%M%S"),
                &Uuid::new_v4().simple().to_string()[..8]
            ),
            action,
            run_id: run_id.to_string(),
            user_id: user_id.unwrap_or("SYSTEM").to_string(),
            level,
            timestamp: now,
            details,
            source_system: source_system.to_string(),
            resolved: false,
        };

        self.append_to_day_file(&entry, now.date_naive())?;
        self.entries.lock().push(entry.clone());

        match level {
            AuditLevel::Error | AuditLevel::Critical => {
                tracing::error!("[{}] {} - run {}", entry.audit_id, action, run_id)
            }
            AuditLevel::Warning => {
                tracing::warn!("[{}] {} - run {}", entry.audit_id, action, run_id)
            }
            AuditLevel::Info => tracing::info!("[{}] {} - run {}", entry.audit_id, action, run_id),
        }

        Ok(entry)
    }

    fn append_to_day_file(&self, entry: &AuditEntry, date: NaiveDate) -> Result<()> {
        let path = self.day_file(date);
        let mut existing: Vec<AuditEntry> = load_json_or_default(&path);

        if existing.len() >= self.max_entries_per_file {
            // Seal the oversized file with a timestamp suffix, start fresh
            let sealed = self.log_dir.join(format!(
                "audit_trail_{}_{}.json",
                date.format("%Y%m%d"),
                Utc::now().format("%H%M%S")
            ));
            fs::rename(&path, &sealed)?;
            tracing::info!("sealed audit log to {}", sealed.display());
            existing = Vec::new();
        }

        existing.push(entry.clone());
        atomic_write_json(&path, &existing)
    }

    /// All entries for a run
    pub fn entries_for_run(&self, run_id: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Last `limit` entries by a user
    pub fn entries_for_user(&self, user_id: &str, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.lock();
        let matched: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        let skip = matched.len().saturating_sub(limit);
        matched.into_iter().skip(skip).collect()
    }

    /// Count of entries with a given action
    pub fn count_action(&self, action: AuditAction) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .count()
    }

    /// Entries whose timestamp falls in `[start, end]` (inclusive, by date)
    pub fn entries_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| {
                let d = e.timestamp.date_naive();
                d >= start && d <= end
            })
            .cloned()
            .collect()
    }

    /// Mark an entry resolved in place. Returns false when the id is unknown.
    pub fn resolve(&self, audit_id: &str) -> Result<bool> {
        let mut found = false;

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.log_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();

        for path in paths {
            let mut entries: Vec<AuditEntry> = load_json_or_default(&path);
            let mut touched = false;
            for entry in entries.iter_mut() {
                if entry.audit_id == audit_id {
                    entry.resolved = true;
                    touched = true;
                    found = true;
                }
            }
            if touched {
                atomic_write_json(&path, &entries)?;
            }
        }

        if found {
            for entry in self.entries.lock().iter_mut() {
                if entry.audit_id == audit_id {
                    entry.resolved = true;
                }
            }
        }

        Ok(found)
    }

    /// Log a file upload
    pub fn log_file_upload(
        &self,
        run_id: &str,
        filename: &str,
        file_size: u64,
        user_id: Option<&str>,
    ) -> Result<AuditEntry> {
        self.log_action(
            AuditAction::FileUploaded,
            run_id,
            user_id,
            AuditLevel::Info,
            serde_json::json!({ "filename": filename, "file_size": file_size }),
            "API",
        )
    }

    /// Log a reconciliation lifecycle event
    pub fn log_recon_event(
        &self,
        run_id: &str,
        action: AuditAction,
        matched: usize,
        unmatched: usize,
        error: Option<&str>,
    ) -> Result<AuditEntry> {
        let level = if matches!(action, AuditAction::ReconFailed) {
            AuditLevel::Error
        } else {
            AuditLevel::Info
        };
        self.log_action(
            action,
            run_id,
            None,
            level,
            serde_json::json!({
                "matched_count": matched,
                "unmatched_count": unmatched,
                "error": error,
            }),
            "ENGINE",
        )
    }

    /// Log a rollback lifecycle event
    pub fn log_rollback(
        &self,
        run_id: &str,
        action: AuditAction,
        rollback_level: &str,
        details: Value,
    ) -> Result<AuditEntry> {
        let level = if matches!(action, AuditAction::RollbackFailed) {
            AuditLevel::Error
        } else {
            AuditLevel::Info
        };
        self.log_action(
            action,
            run_id,
            None,
            level,
            serde_json::json!({ "rollback_level": rollback_level, "details": details }),
            "ROLLBACK",
        )
    }

    /// Log an exception at ERROR level
    pub fn log_exception(
        &self,
        run_id: &str,
        exception_type: &str,
        message: &str,
    ) -> Result<AuditEntry> {
        self.log_action(
            AuditAction::ExceptionLogged,
            run_id,
            None,
            AuditLevel::Error,
            serde_json::json!({ "exception_type": exception_type, "error_message": message }),
            "ENGINE",
        )
    }
}
