//! Common test utilities

use chrono::{DateTime, TimeZone, Utc};
use pacer::scheduler::{
    DistributionListener, DistributionScheduler, FixedClock, ManualTimer, RequestExecutor,
};
use pacer::storage::MemoryStateStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed start instant used by deterministic tests
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

/// Executor recording every `(index, total)` it is asked to dispatch
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn indexes(&self) -> Vec<usize> {
        self.calls().into_iter().map(|(index, _)| index).collect()
    }
}

impl RequestExecutor for RecordingExecutor {
    fn execute(&mut self, index: usize, total: usize) {
        self.calls.lock().unwrap().push((index, total));
    }
}

/// Event observed by a [`RecordingListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Status { running: bool, progress: u8 },
    Scheduled { delay: Duration, index: usize, total: usize },
}

/// Listener recording every callback
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Observed>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn statuses(&self) -> Vec<(bool, u8)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Status { running, progress } => Some((running, progress)),
                Observed::Scheduled { .. } => None,
            })
            .collect()
    }

    #[allow(dead_code)]
    pub fn progress_values(&self) -> Vec<u8> {
        self.statuses().into_iter().map(|(_, p)| p).collect()
    }
}

impl DistributionListener for RecordingListener {
    fn on_status_changed(&self, running: bool, progress: u8) {
        self.events
            .lock()
            .unwrap()
            .push(Observed::Status { running, progress });
    }

    fn on_request_scheduled(&self, delay: Duration, index: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(Observed::Scheduled { delay, index, total });
    }
}

/// Scheduler wired to inspectable collaborators
pub struct Harness {
    pub scheduler: DistributionScheduler,
    pub executor: RecordingExecutor,
    pub timer: ManualTimer,
    pub store: MemoryStateStore,
    pub clock: FixedClock,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    /// Fresh scheduler over an empty store
    pub fn new() -> Self {
        Self::with_store(MemoryStateStore::new())
    }

    /// Scheduler over an existing store, as after a process restart
    pub fn with_store(store: MemoryStateStore) -> Self {
        Self::with_store_at(store, test_epoch())
    }

    /// Scheduler over an existing store with the clock at `now`
    pub fn with_store_at(store: MemoryStateStore, now: DateTime<Utc>) -> Self {
        let executor = RecordingExecutor::new();
        let timer = ManualTimer::new();
        let clock = FixedClock::new(now);
        let listener = RecordingListener::new();

        let mut scheduler =
            DistributionScheduler::new(store.clone(), executor.clone(), timer.clone())
                .with_clock(clock.clone());
        scheduler.add_listener(listener.clone());

        Self {
            scheduler,
            executor,
            timer,
            store,
            clock,
            listener,
        }
    }

    /// Deliver the pending timer, advancing the clock by its delay
    pub fn fire(&mut self) {
        let armed = self.timer.next_pending().expect("a pending timer");
        self.clock.advance(armed.delay);
        let handle = self.timer.fire_next().expect("a pending timer");
        self.scheduler.on_timer_fired(handle);
    }

    /// Delay of the pending timer
    #[allow(dead_code)]
    pub fn pending_delay(&self) -> Option<Duration> {
        self.timer.next_pending().map(|t| t.delay)
    }
}
