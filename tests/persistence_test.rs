//! Recovery across real storage backends

mod common;

use common::Harness;
use pacer::scheduler::{
    DistributionScheduler, FixedClock, ManualTimer, PersistenceAdapter, ScheduleSpec,
};
use pacer::storage::{FileStateStore, SqliteStateStore};
use std::time::Duration;
use tempfile::TempDir;

fn run_two_ticks_then_pause(store: impl PersistenceAdapter + 'static) {
    let executor = common::RecordingExecutor::new();
    let timer = ManualTimer::new();
    let mut scheduler = DistributionScheduler::new(store, executor.clone(), timer.clone())
        .with_clock(FixedClock::new(common::test_epoch()));

    scheduler
        .configure(ScheduleSpec::uniform(10, Duration::from_secs(90)).unwrap())
        .unwrap();
    scheduler.start().unwrap();
    scheduler.on_timer_fired(timer.fire_next().unwrap());
    scheduler.pause().unwrap();

    assert_eq!(executor.indexes(), vec![0, 1]);
}

fn recover_from(store: impl PersistenceAdapter + 'static) -> DistributionScheduler {
    let mut scheduler = DistributionScheduler::new(
        store,
        common::RecordingExecutor::new(),
        ManualTimer::new(),
    );
    assert!(scheduler.recover().unwrap());
    scheduler
}

#[test]
fn test_file_store_recovery() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    run_two_ticks_then_pause(FileStateStore::new(&path));
    assert!(path.exists());

    let scheduler = recover_from(FileStateStore::new(&path));
    assert!(scheduler.is_paused());
    assert_eq!(scheduler.current_index(), 2);
    assert_eq!(scheduler.progress(), 20);
}

#[test]
fn test_sqlite_store_recovery() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");

    run_two_ticks_then_pause(SqliteStateStore::open(&path, "run").unwrap());

    let mut scheduler = recover_from(SqliteStateStore::open(&path, "run").unwrap());
    assert!(scheduler.is_paused());
    assert_eq!(scheduler.current_index(), 2);

    scheduler.stop().unwrap();
    let store = SqliteStateStore::open(&path, "run").unwrap();
    assert!(store.load().unwrap().is_none());
}

#[test]
fn test_corrupt_file_starts_clean() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "not json at all").unwrap();

    let mut scheduler = DistributionScheduler::new(
        FileStateStore::new(&path),
        common::RecordingExecutor::new(),
        ManualTimer::new(),
    );
    assert!(!scheduler.recover().unwrap());
    assert!(!path.exists());
}

#[test]
fn test_save_failure_does_not_interrupt_run() {
    let mut h = Harness::new();
    h.store.set_fail_writes(true);

    h.scheduler
        .configure(ScheduleSpec::uniform(3, Duration::from_secs(3)).unwrap())
        .unwrap();
    h.scheduler.start().unwrap();
    h.fire();
    h.fire();

    assert_eq!(h.executor.indexes(), vec![0, 1, 2]);
    assert_eq!(h.scheduler.progress(), 100);
    assert_eq!(h.store.save_count(), 0);
}
