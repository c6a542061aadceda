//! Timer and clock seams
//!
//! The scheduler never sleeps or reads the system clock directly. It arms
//! delays through a [`TimerService`] and reads "now" through a [`Clock`], so
//! the same state machine runs on the tokio runtime in production and under
//! a fully deterministic [`ManualTimer`] in tests.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ============================================================================
// Timer Service
// ============================================================================

/// Opaque identifier of one armed delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Create a handle from a raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Single-threaded delayed-callback primitive
///
/// The callback is implicit: when an armed delay elapses, the implementation
/// hands its [`TimerHandle`] back to the owning scheduler through
/// [`DistributionScheduler::on_timer_fired`](super::engine::DistributionScheduler::on_timer_fired),
/// on the scheduler's own context. Firing a handle that was cancelled in the
/// meantime is harmless; the scheduler ignores handles it is not waiting on.
pub trait TimerService: Send {
    /// Arm a delay and return its handle
    fn post_delayed(&mut self, delay: Duration) -> TimerHandle;

    /// Cancel a previously armed delay
    fn cancel(&mut self, handle: TimerHandle);
}

// ============================================================================
// Manual Timer
// ============================================================================

/// Record of one delay armed on a [`ManualTimer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub handle: TimerHandle,
    pub delay: Duration,
    pub cancelled: bool,
    pub fired: bool,
}

impl ArmedTimer {
    /// Armed and neither cancelled nor fired
    pub fn is_pending(&self) -> bool {
        !self.cancelled && !self.fired
    }
}

#[derive(Debug, Default)]
struct ManualTimerInner {
    next_id: u64,
    armed: Vec<ArmedTimer>,
}

/// Timer that never fires on its own
///
/// Clones share state, so a caller can hand one clone to the scheduler and
/// keep another to inspect what was armed and to pick the next handle to
/// deliver.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    inner: Arc<Mutex<ManualTimerInner>>,
}

impl ManualTimer {
    /// Create a new manual timer
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualTimerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every delay armed so far, in arming order
    pub fn history(&self) -> Vec<ArmedTimer> {
        self.lock().armed.clone()
    }

    /// Delays still waiting to fire
    pub fn pending(&self) -> Vec<ArmedTimer> {
        self.lock()
            .armed
            .iter()
            .filter(|t| t.is_pending())
            .copied()
            .collect()
    }

    /// Most recently armed delay that is still pending
    pub fn next_pending(&self) -> Option<ArmedTimer> {
        self.lock().armed.iter().rev().find(|t| t.is_pending()).copied()
    }

    /// Mark the next pending delay as fired and return its handle
    ///
    /// The caller delivers the handle to the scheduler.
    pub fn fire_next(&self) -> Option<TimerHandle> {
        let mut inner = self.lock();
        let timer = inner.armed.iter_mut().rev().find(|t| t.is_pending())?;
        timer.fired = true;
        Some(timer.handle)
    }

    /// Number of delays armed so far
    pub fn armed_count(&self) -> usize {
        self.lock().armed.len()
    }

    /// Number of delays cancelled so far
    pub fn cancelled_count(&self) -> usize {
        self.lock().armed.iter().filter(|t| t.cancelled).count()
    }
}

impl TimerService for ManualTimer {
    fn post_delayed(&mut self, delay: Duration) -> TimerHandle {
        let mut inner = self.lock();
        inner.next_id += 1;
        let handle = TimerHandle(inner.next_id);
        inner.armed.push(ArmedTimer {
            handle,
            delay,
            cancelled: false,
            fired: false,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(timer) = self.lock().armed.iter_mut().find(|t| t.handle == handle) {
            timer.cancelled = true;
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::milliseconds(by.as_millis() as i64);
    }

    /// Jump to an instant
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
