//! JSON file state store

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::scheduler::{DistributionState, PersistenceAdapter, SchedulerError, SchedulerResult};

/// Persists the distribution state as a single JSON file
///
/// Saves go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a store backed by `path`; the file is created on first save
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistenceAdapter for FileStateStore {
    fn save(&self, state: &DistributionState) -> SchedulerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SchedulerError::persistence_write("create_dir", e.to_string()))?;
        }

        let temp_path = self.temp_path();
        let file = File::create(&temp_path)
            .map_err(|e| SchedulerError::persistence_write("create", e.to_string()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer
            .flush()
            .map_err(|e| SchedulerError::persistence_write("flush", e.to_string()))?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| SchedulerError::persistence_write("rename", e.to_string()))?;

        tracing::debug!(path = %self.path.display(), index = state.current_index, "State saved");
        Ok(())
    }

    fn load(&self) -> SchedulerResult<Option<DistributionState>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SchedulerError::io_error("open", e.to_string())),
        };

        let state = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SchedulerError::corrupt(format!("{}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), "State loaded");
        Ok(Some(state))
    }

    fn clear(&self) -> SchedulerResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "State cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SchedulerError::io_error("remove", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ScheduleSpec;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_state() -> DistributionState {
        let spec = ScheduleSpec::uniform(10, Duration::from_secs(60)).unwrap();
        let mut state = DistributionState::new(spec, Utc::now());
        state.current_index = 4;
        state
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/state.json"));
        let state = sample_state();

        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));

        store.save(&sample_state()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_file_reported() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(
            store.load(),
            Err(SchedulerError::RecoveryDataCorrupt { .. })
        ));
    }
}
