//! In-process state store

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::scheduler::{DistributionState, PersistenceAdapter, SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
struct Slot {
    payload: Option<String>,
    fail_writes: bool,
    saves: usize,
}

/// Shared in-memory slot holding the serialized state
///
/// Clones share the slot, so a store outlives the scheduler it was handed
/// to and a second scheduler can recover from it, as after a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    slot: Arc<Mutex<Slot>>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent save and clear fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Replace the stored payload verbatim
    pub fn put_raw(&self, payload: impl Into<String>) {
        self.lock().payload = Some(payload.into());
    }

    /// Stored payload, if any
    pub fn raw(&self) -> Option<String> {
        self.lock().payload.clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }
}

impl PersistenceAdapter for MemoryStateStore {
    fn save(&self, state: &DistributionState) -> SchedulerResult<()> {
        let payload = state.to_json()?;
        let mut slot = self.lock();
        if slot.fail_writes {
            return Err(SchedulerError::persistence_write("save", "writes disabled"));
        }
        slot.payload = Some(payload);
        slot.saves += 1;
        Ok(())
    }

    fn load(&self) -> SchedulerResult<Option<DistributionState>> {
        self.lock()
            .payload
            .as_deref()
            .map(|json| {
                DistributionState::from_json(json)
                    .map_err(|e| SchedulerError::corrupt(e.to_string()))
            })
            .transpose()
    }

    fn clear(&self) -> SchedulerResult<()> {
        let mut slot = self.lock();
        if slot.fail_writes {
            return Err(SchedulerError::persistence_write("clear", "writes disabled"));
        }
        slot.payload = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ScheduleSpec;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_clones_share_slot() {
        let store = MemoryStateStore::new();
        let other = store.clone();

        let spec = ScheduleSpec::uniform(3, Duration::from_secs(3)).unwrap();
        store.save(&DistributionState::new(spec, Utc::now())).unwrap();

        assert!(other.load().unwrap().is_some());
        assert_eq!(other.save_count(), 1);
    }

    #[test]
    fn test_failing_writes() {
        let store = MemoryStateStore::new();
        store.set_fail_writes(true);

        let spec = ScheduleSpec::uniform(3, Duration::from_secs(3)).unwrap();
        assert!(store.save(&DistributionState::new(spec, Utc::now())).is_err());
        assert!(store.raw().is_none());
    }

    #[test]
    fn test_raw_payload_parsed_on_load() {
        let store = MemoryStateStore::new();
        store.put_raw("[]");
        assert!(matches!(
            store.load(),
            Err(SchedulerError::RecoveryDataCorrupt { .. })
        ));
    }
}
