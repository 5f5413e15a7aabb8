//! Carry-over store for hanging transactions
//!
//! A cycle that ends with an RRN in HANGING writes it here; the next cycle
//! loads the state, resolves entries that reappeared in NPCI, and ages the
//! rest. Read failure is not fatal: a missing or corrupt state file is an
//! empty state, and the next write overwrites it.

use crate::error::Result;
use crate::store::{atomic_write_json, load_json_or_default};
use crate::types::CarryOverState;
use chrono::Utc;
use std::path::PathBuf;

/// Number of persisted cycles after which an auto-TTUM fires
pub const AUTO_TTUM_AGE: u32 = 2;

/// File-backed carry-over state for one run
#[derive(Debug, Clone)]
pub struct CarryOverStore {
    path: PathBuf,
}

impl CarryOverStore {
    /// Bind the store to its `hanging_state.json` path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the previous cycle's state; missing or corrupt files are empty
    pub fn load(&self) -> CarryOverState {
        let state: CarryOverState = load_json_or_default(&self.path);
        tracing::debug!(
            "loaded {} carry-over entries from {}",
            state.entries.len(),
            self.path.display()
        );
        state
    }

    /// Persist the state for the next cycle (temp file + atomic rename)
    pub fn save(&self, state: &CarryOverState) -> Result<()> {
        let mut stamped = state.clone();
        stamped.updated_at = Utc::now();
        atomic_write_json(&self.path, &stamped)?;
        tracing::info!(
            "saved {} carry-over entries to {}",
            stamped.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CarryOverEntry, DrCr};
    use rust_decimal::Decimal;

    fn entry(rrn: &str, cycles: u32) -> CarryOverEntry {
        CarryOverEntry {
            rrn: rrn.to_string(),
            amount: Decimal::new(7500, 2),
            dr_cr: DrCr::Debit,
            reason: "SWITCH_ONLY".to_string(),
            first_seen_cycle: Some("1C".to_string()),
            last_cycle_id: Some("1C".to_string()),
            cycles_persisted: cycles,
        }
    }

    #[test]
    fn test_missing_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CarryOverStore::new(dir.path().join("hanging_state.json"));
        let state = store.load();
        assert!(state.entries.is_empty());
        assert_eq!(state.last_cycle_id, None);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CarryOverStore::new(dir.path().join("hanging_state.json"));

        let state = CarryOverState {
            entries: vec![entry("300000000003", 1)],
            last_cycle_id: Some("2C".to_string()),
            updated_at: Utc::now(),
        };
        store.save(&state).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].rrn, "300000000003");
        assert_eq!(loaded.entries[0].cycles_persisted, 1);
        assert_eq!(loaded.last_cycle_id.as_deref(), Some("2C"));
    }

    #[test]
    fn test_corrupt_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hanging_state.json");
        std::fs::write(&path, b"{broken").unwrap();

        let store = CarryOverStore::new(&path);
        assert!(store.load().entries.is_empty());

        // The next save overwrites the corrupt file cleanly
        store
            .save(&CarryOverState {
                entries: vec![entry("123456789012", 0)],
                last_cycle_id: Some("3C".to_string()),
                updated_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(store.load().entries.len(), 1);
    }
}
