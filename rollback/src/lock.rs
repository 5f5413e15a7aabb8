//! Per-run rollback lock
//!
//! One exclusive advisory lock file per run
//! (`<output>/<run_id>.rollback.lock`). Acquisition is non-blocking:
//! contention surfaces immediately as a busy error with no retries at
//! this layer. The lock releases on drop.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held exclusive lock over a run's rollback operations
#[derive(Debug)]
pub struct RollbackLock {
    file: File,
    path: PathBuf,
}

impl RollbackLock {
    /// Try to acquire the lock; fails fast when another holder exists
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| {
            Error::Busy(format!(
                "another rollback operation holds {}",
                path.display()
            ))
        })?;

        tracing::debug!("acquired rollback lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the held lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RollbackLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("failed to release rollback lock {}: {}", self.path.display(), e);
        } else {
            tracing::debug!("released rollback lock {}", self.path.display());
        }
    }
}
