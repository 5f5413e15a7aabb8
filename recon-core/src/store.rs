//! Per-run output tree and atomic file persistence
//!
//! The output directory is the commit boundary: every JSON artefact is
//! staged to a sibling temp file, fsynced, and atomically renamed over the
//! target. Readers never observe a half-written file.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Paths of one run's output tree
#[derive(Debug, Clone)]
pub struct RunPaths {
    output_root: PathBuf,
    run_id: String,
}

impl RunPaths {
    /// Bind a run id under an output root
    pub fn new(output_root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            output_root: output_root.into(),
            run_id: run_id.into(),
        }
    }

    /// Run identifier
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Output root shared across runs
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// This run's directory
    pub fn run_dir(&self) -> PathBuf {
        self.output_root.join(&self.run_id)
    }

    /// Final reconciliation result
    pub fn recon_output(&self) -> PathBuf {
        self.run_dir().join("recon_output.json")
    }

    /// Carry-over entries
    pub fn hanging_state(&self) -> PathBuf {
        self.run_dir().join("hanging_state.json")
    }

    /// Vouchers and GL entries
    pub fn accounting_output(&self) -> PathBuf {
        self.run_dir().join("accounting_output.json")
    }

    /// Rollback history, shared across runs at the output root
    pub fn rollback_history(&self) -> PathBuf {
        self.output_root.join("rollback_history.json")
    }

    /// Rollback lock file for this run
    pub fn rollback_lock(&self) -> PathBuf {
        self.output_root.join(format!("{}.rollback.lock", self.run_id))
    }

    /// Daily audit logs
    pub fn audit_logs_dir(&self) -> PathBuf {
        self.run_dir().join("audit_logs")
    }

    /// Report CSV/XLSX outputs
    pub fn reports_dir(&self) -> PathBuf {
        self.run_dir().join("reports")
    }

    /// TTUM category files
    pub fn ttum_dir(&self) -> PathBuf {
        self.run_dir().join("ttum")
    }

    /// Annexure IV outputs
    pub fn annexure_dir(&self) -> PathBuf {
        self.run_dir().join("annexure")
    }

    /// Per-cycle audit artefacts
    pub fn audit_dir(&self) -> PathBuf {
        self.run_dir().join("audit")
    }

    /// GL statement outputs
    pub fn gl_statement_dir(&self) -> PathBuf {
        self.run_dir().join("gl_statement")
    }

    /// TTUM download marker
    pub fn ttum_download_meta(&self) -> PathBuf {
        self.ttum_dir().join("download_meta.json")
    }

    /// Cycle-scoped subdirectory under one of the output areas
    pub fn cycle_subdir(&self, base: &Path, cycle_id: &str) -> PathBuf {
        base.join(format!("cycle_{}", cycle_id))
    }

    /// Create the full directory layout for this run
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.run_dir(),
            self.audit_logs_dir(),
            self.reports_dir(),
            self.ttum_dir(),
            self.annexure_dir(),
            self.audit_dir(),
            self.gl_statement_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "staged".to_string());
    path.with_file_name(format!("{}.tmp", file_name))
}

/// Write bytes via a sibling temp file, fsync, and atomic rename
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staged = staging_path(path);
    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&staged)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&staged, path)?;
        Ok(())
    })();

    if result.is_err() {
        // Unlink the partial staging file; the primary path stays untouched
        let _ = fs::remove_file(&staged);
    }
    result
}

/// Serialize a value to pretty JSON and write it atomically
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &json)
}

/// Load a JSON file, failing on absence or corruption
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// Load a JSON file, treating absence or corruption as the default value
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read(path) {
        Ok(content) => match serde_json::from_slice(&content) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("{}: corrupt JSON treated as empty ({})", path.display(), e);
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

/// TTUM download marker persisted at `ttum/download_meta.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadMeta {
    /// True once the TTUM files have been handed to an operator
    pub is_downloaded: bool,

    /// When the download happened
    pub downloaded_at: Option<DateTime<Utc>>,

    /// Who downloaded
    pub downloaded_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Probe {
        value: u32,
    }

    #[test]
    fn test_atomic_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.json");

        atomic_write_json(&path, &Probe { value: 7 }).unwrap();
        let loaded: Probe = load_json(&path).unwrap();
        assert_eq!(loaded, Probe { value: 7 });

        // No staging residue left behind
        assert!(!dir.path().join("probe.json.tmp").exists());
    }

    #[test]
    fn test_load_or_default_tolerates_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.json");

        let missing: Probe = load_json_or_default(&path);
        assert_eq!(missing, Probe::default());

        fs::write(&path, b"{not json").unwrap();
        let corrupt: Probe = load_json_or_default(&path);
        assert_eq!(corrupt, Probe::default());
    }

    #[test]
    fn test_run_layout_paths() {
        let paths = RunPaths::new("/out", "RUN_1");
        assert_eq!(
            paths.recon_output(),
            PathBuf::from("/out/RUN_1/recon_output.json")
        );
        assert_eq!(
            paths.rollback_history(),
            PathBuf::from("/out/rollback_history.json")
        );
        assert_eq!(
            paths.rollback_lock(),
            PathBuf::from("/out/RUN_1.rollback.lock")
        );
        assert_eq!(
            paths.cycle_subdir(&paths.reports_dir(), "1C"),
            PathBuf::from("/out/RUN_1/reports/cycle_1C")
        );
    }

    #[test]
    fn test_ensure_layout_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "RUN_2");
        paths.ensure_layout().unwrap();
        assert!(paths.reports_dir().is_dir());
        assert!(paths.ttum_dir().is_dir());
        assert!(paths.annexure_dir().is_dir());
        assert!(paths.audit_logs_dir().is_dir());
    }
}
