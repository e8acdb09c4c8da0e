//! Checkpoint store — atomic file-backed JSON state
//!
//! Single writer (the orchestrator). Saves go through a temp file in the
//! same directory, fsync, then rename, so a crash mid-write leaves the
//! previous checkpoint intact.

use crate::error::{MigrateError, MigrateResult};
use crate::models::MigrationState;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed checkpoint store
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint; `Ok(None)` when no checkpoint exists
    pub fn load(&self) -> MigrateResult<Option<MigrationState>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: MigrationState = serde_json::from_str(&data).map_err(|e| {
            MigrateError::Serialization(format!(
                "corrupt checkpoint {}: {e}",
                self.path.display()
            ))
        })?;

        Ok(Some(state))
    }

    /// Write the checkpoint atomically (temp + fsync + rename)
    pub fn save(&self, state: &MigrationState) -> MigrateResult<()> {
        let data = serde_json::to_vec_pretty(state)?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(
            path = %self.path.display(),
            completed = state.completed_count,
            failed = state.failed_count,
            "checkpoint saved"
        );
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the checkpoint file; a no-op when absent
    pub fn delete(&self) -> MigrateResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompletedSchema;
    use chrono::Utc;

    fn store_in(dir: &tempfile::TempDir) -> CheckpointStore {
        CheckpointStore::new(dir.path().join("state.json"))
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = MigrationState::new("cfg-hash");
        state.total_schemas = 3;
        state.completed_count = 1;
        state.skipped_count = 1;
        state.migration_order = vec!["reg:a".into(), "reg:b".into(), "reg:c".into()];
        state.completed_schemas.insert(
            "reg:a".into(),
            CompletedSchema {
                source_registry: "reg".into(),
                source_schema: "a".into(),
                target_subject: "a-value".into(),
                versions: 2,
                completed_at: Utc::now(),
            },
        );

        store.save(&state).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.config_hash, "cfg-hash");
        assert_eq!(loaded.total_schemas, 3);
        assert_eq!(loaded.completed_count, 1);
        assert_eq!(loaded.skipped_count, 1);
        assert_eq!(loaded.migration_order, state.migration_order);
        assert_eq!(loaded.completed_schemas["reg:a"].versions, 2);
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = MigrationState::new("h");
        store.save(&state).unwrap();

        state.completed_count = 7;
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.completed_count, 7);
        // no temp file left behind
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_checkpoint_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{definitely not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.delete().unwrap();

        store.save(&MigrationState::new("h")).unwrap();
        store.delete().unwrap();
        assert!(!store.exists());
        store.delete().unwrap();
    }
}
