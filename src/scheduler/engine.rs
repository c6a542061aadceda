//! Distribution scheduler state machine
//!
//! [`DistributionScheduler`] owns the [`DistributionState`] and drives it
//! through `Idle -> Running <-> Paused -> Idle`, one request per tick.
//!
//! The scheduler is a plain synchronous value: every method mutates it
//! directly and none of them block. It must live on a single scheduling
//! context, which also delivers timer firings through
//! [`on_timer_fired`](DistributionScheduler::on_timer_fired). The async
//! [`SchedulerHandle`](super::runtime::SchedulerHandle) provides that context
//! on tokio; tests and embedders can drive it by hand with a
//! [`ManualTimer`](super::timer::ManualTimer).
//!
//! # Index semantics
//!
//! `current_index` counts requests already dispatched. While it is `k`
//! (`0 < k < total`) the pending wait is `delays[k - 1]`, the wait between
//! request `k - 1` and request `k`.

use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::calculator::{self, DelaySequence};
use super::error::{SchedulerError, SchedulerResult};
use super::executor::RequestExecutor;
use super::listener::{DistributionEvent, DistributionListener, ListenerId, ListenerRegistry};
use super::persistence::PersistenceAdapter;
use super::spec::{DistributionPattern, PeakWindow, ScheduleSpec};
use super::state::{DistributionState, DistributionStatus, SchedulerPhase};
use super::timer::{Clock, SystemClock, TimerHandle, TimerService};

/// Stateful engine dispatching a schedule one request at a time
pub struct DistributionScheduler {
    persistence: Box<dyn PersistenceAdapter>,
    executor: Box<dyn RequestExecutor>,
    timer: Box<dyn TimerService>,
    clock: Box<dyn Clock>,
    listeners: ListenerRegistry,

    /// Configured schedule
    spec: Option<ScheduleSpec>,

    /// Waits computed from `spec`
    delays: DelaySequence,

    /// Current or most recent run
    state: Option<DistributionState>,

    /// Wait the scheduler is currently blocked on
    pending: Option<TimerHandle>,

    /// Set by the first lifecycle call; `recover` is only valid before it
    initialized: bool,
}

impl DistributionScheduler {
    /// Create a scheduler on the system clock
    pub fn new(
        persistence: impl PersistenceAdapter + 'static,
        executor: impl RequestExecutor + 'static,
        timer: impl TimerService + 'static,
    ) -> Self {
        Self {
            persistence: Box::new(persistence),
            executor: Box::new(executor),
            timer: Box::new(timer),
            clock: Box::new(SystemClock),
            listeners: ListenerRegistry::new(),
            spec: None,
            delays: DelaySequence::default(),
            state: None,
            pending: None,
            initialized: false,
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a listener
    pub fn add_listener(&mut self, listener: Arc<dyn DistributionListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregister a listener
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Install a schedule and compute its delay sequence
    ///
    /// Only valid while idle. Discards the record of any previous run.
    pub fn configure(&mut self, spec: ScheduleSpec) -> SchedulerResult<()> {
        self.initialized = true;

        let phase = self.phase();
        if phase.is_active() {
            tracing::warn!(state = %phase, "Cannot configure an active distribution");
            return Err(SchedulerError::invalid_state("configure", phase.as_str()));
        }

        let anchor = self.clock.now().with_timezone(&Local);
        self.delays = calculator::compute(&spec, &anchor)?;

        tracing::info!(
            total = spec.total_requests,
            window_secs = spec.duration_window.as_secs(),
            pattern = %spec.pattern,
            "Configured schedule"
        );

        self.spec = Some(spec);
        self.state = None;
        Ok(())
    }

    /// Build and install a schedule from its parts
    pub fn configure_schedule(
        &mut self,
        total_requests: usize,
        duration_window: Duration,
        pattern: DistributionPattern,
        peak: Option<PeakWindow>,
    ) -> SchedulerResult<()> {
        let mut builder = ScheduleSpec::builder()
            .total_requests(total_requests)
            .duration_window(duration_window)
            .pattern(pattern);
        if let Some(peak) = peak {
            builder = builder.peak(peak);
        }

        let spec = builder.build().inspect_err(|e| {
            self.initialized = true;
            tracing::warn!(error = %e, "Rejected schedule");
        })?;
        self.configure(spec)
    }

    /// Begin a fresh run: dispatch request 0 now and arm the first wait
    pub fn start(&mut self) -> SchedulerResult<()> {
        self.initialized = true;

        match self.phase() {
            SchedulerPhase::Running => {
                tracing::warn!("Distribution already running");
                return Err(SchedulerError::AlreadyRunning);
            }
            SchedulerPhase::Paused => {
                tracing::warn!("Distribution is paused; resume or stop it first");
                return Err(SchedulerError::invalid_state("start", "paused"));
            }
            SchedulerPhase::Idle => {}
        }

        let Some(spec) = self.spec.clone() else {
            tracing::warn!("Cannot start without a configured schedule");
            return Err(SchedulerError::NotConfigured);
        };

        let now = self.clock.now();
        if spec.is_time_anchored() {
            self.delays = calculator::compute(&spec, &now.with_timezone(&Local))?;
        }

        tracing::info!(
            total = spec.total_requests,
            pattern = %spec.pattern,
            "Started traffic distribution"
        );

        self.state = Some(DistributionState::new(spec, now));
        self.persist("start");
        self.dispatch_next(Some(DistributionEvent::StatusChanged {
            running: true,
            progress: 0,
        }));
        Ok(())
    }

    /// Hold position; the in-flight wait is discarded
    pub fn pause(&mut self) -> SchedulerResult<()> {
        self.initialized = true;

        let phase = self.phase();
        if phase != SchedulerPhase::Running {
            tracing::warn!(state = %phase, "Cannot pause distribution");
            return Err(SchedulerError::invalid_state("pause", phase.as_str()));
        }

        self.cancel_pending();
        if let Some(state) = self.state.as_mut() {
            state.is_running = false;
            state.is_paused = true;
        }
        self.persist("pause");

        tracing::info!(index = self.current_index(), "Paused traffic distribution");
        self.emit(DistributionEvent::StatusChanged {
            running: false,
            progress: self.progress(),
        });
        Ok(())
    }

    /// Continue a paused run with a fresh, full-length wait
    pub fn resume(&mut self) -> SchedulerResult<()> {
        self.initialized = true;

        let phase = self.phase();
        if phase != SchedulerPhase::Paused {
            tracing::warn!(state = %phase, "Cannot resume distribution");
            return Err(SchedulerError::invalid_state("resume", phase.as_str()));
        }

        if let Some(state) = self.state.as_mut() {
            state.is_running = true;
            state.is_paused = false;
        }
        let scheduled = self.arm_next_tick();
        self.persist("resume");

        tracing::info!(index = self.current_index(), "Resumed traffic distribution");
        self.emit(scheduled);
        self.emit(DistributionEvent::StatusChanged {
            running: true,
            progress: self.progress(),
        });
        Ok(())
    }

    /// Abandon the run and forget its persisted state
    pub fn stop(&mut self) -> SchedulerResult<()> {
        self.initialized = true;

        let phase = self.phase();
        if !phase.is_active() {
            tracing::warn!(state = %phase, "Cannot stop distribution");
            return Err(SchedulerError::invalid_state("stop", phase.as_str()));
        }

        self.cancel_pending();
        let now = self.clock.now();
        if let Some(state) = self.state.as_mut() {
            state.is_running = false;
            state.is_paused = false;
            state.touch(now);
        }
        self.clear_persisted("stop");

        tracing::info!(index = self.current_index(), "Stopped traffic distribution");
        self.emit(DistributionEvent::StatusChanged {
            running: false,
            progress: self.progress(),
        });
        Ok(())
    }

    /// Restore a run persisted by a previous process
    ///
    /// Only valid before any other lifecycle call. Returns `Ok(false)` when
    /// there is nothing to restore, including when the stored data is
    /// corrupt (it is discarded). A restored run that was not paused resumes
    /// ticking immediately from its saved position with a full-length wait.
    pub fn recover(&mut self) -> SchedulerResult<bool> {
        if self.initialized {
            return Err(SchedulerError::invalid_state("recover", "initialized"));
        }
        self.initialized = true;

        let saved = match self.persistence.load() {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                tracing::debug!("No saved distribution state");
                return Ok(false);
            }
            Err(e) => {
                self.discard_corrupt(&e);
                return Ok(false);
            }
        };

        if let Err(e) = saved.validate() {
            self.discard_corrupt(&e);
            return Ok(false);
        }

        if saved.is_complete() {
            tracing::info!(
                total = saved.total_requests(),
                "Saved distribution had already finished"
            );
            self.clear_persisted("recover");
            return Ok(false);
        }

        let delays = match calculator::compute(&saved.spec, &saved.local_start()) {
            Ok(delays) => delays,
            Err(e) => {
                self.discard_corrupt(&e);
                return Ok(false);
            }
        };

        let paused = saved.is_paused;
        let mut state = saved;
        state.is_running = !paused;
        state.is_paused = paused;

        tracing::info!(
            index = state.current_index,
            total = state.total_requests(),
            pattern = %state.spec.pattern,
            paused,
            "Restored distribution state"
        );

        self.spec = Some(state.spec.clone());
        self.delays = delays;
        self.state = Some(state);

        let scheduled = (!paused).then(|| self.arm_next_tick());
        self.persist("recover");
        if let Some(event) = scheduled {
            self.emit(event);
        }
        self.emit(DistributionEvent::StatusChanged {
            running: !paused,
            progress: self.progress(),
        });
        Ok(true)
    }

    /// Deliver an elapsed timer
    ///
    /// Handles other than the one currently awaited (cancelled or superseded)
    /// are ignored.
    pub fn on_timer_fired(&mut self, handle: TimerHandle) {
        if self.pending != Some(handle) {
            tracing::debug!(timer = handle.id(), "Ignoring stale timer");
            return;
        }
        self.pending = None;

        if self.phase() != SchedulerPhase::Running {
            return;
        }
        self.dispatch_next(None);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current lifecycle phase
    pub fn phase(&self) -> SchedulerPhase {
        self.state
            .as_ref()
            .map(DistributionState::phase)
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == SchedulerPhase::Running
    }

    pub fn is_paused(&self) -> bool {
        self.phase() == SchedulerPhase::Paused
    }

    /// Requests dispatched in the current or most recent run
    pub fn current_index(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.current_index)
    }

    /// Progress of the current or most recent run (0-100)
    pub fn progress(&self) -> u8 {
        if self.spec.is_none() {
            return 0;
        }
        self.state.as_ref().map_or(0, DistributionState::progress)
    }

    /// Time until the last request is dispatched
    ///
    /// Counts the pending wait in full, matching what `resume` would arm.
    pub fn estimated_remaining(&self) -> Duration {
        self.state
            .as_ref()
            .map_or_else(|| self.delays.total(), |s| s.remaining_time(&self.delays))
    }

    /// Wall-clock estimate of the last dispatch
    pub fn estimated_completion_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        calculator::shift(&now, self.estimated_remaining())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn spec(&self) -> Option<&ScheduleSpec> {
        self.spec.as_ref()
    }

    pub fn delays(&self) -> &DelaySequence {
        &self.delays
    }

    pub fn state(&self) -> Option<&DistributionState> {
        self.state.as_ref()
    }

    /// Point-in-time snapshot
    pub fn status(&self) -> DistributionStatus {
        let now = self.clock.now();
        match (&self.state, &self.spec) {
            (Some(state), Some(_)) => DistributionStatus::from_state(state, &self.delays, now),
            _ => DistributionStatus {
                phase: SchedulerPhase::Idle,
                progress: 0,
                current_index: 0,
                total_requests: self.spec.as_ref().map_or(0, |s| s.total_requests),
                pattern: self.spec.as_ref().map(|s| s.pattern),
                started_at: None,
                remaining: self.delays.total(),
                estimated_completion: calculator::shift(&now, self.delays.total())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Tick: dispatch request `current_index`, then arm the next wait or
    /// finish the run
    ///
    /// Listeners hear `RequestScheduled` once the new position is persisted,
    /// followed by `announce` if given. A run that finishes here announces
    /// before its final `StatusChanged`.
    fn dispatch_next(&mut self, announce: Option<DistributionEvent>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let index = state.current_index;
        let total = state.total_requests();
        self.executor.execute(index, total);
        state.current_index += 1;
        let finished = state.current_index >= total;

        tracing::debug!(index, total, "Executed request {}/{}", index + 1, total);

        if finished {
            if let Some(event) = announce {
                self.emit(event);
            }
            self.complete();
        } else {
            let scheduled = self.arm_next_tick();
            self.persist("tick");
            self.emit(scheduled);
            if let Some(event) = announce {
                self.emit(event);
            }
        }
    }

    /// Arm the wait preceding request `current_index`
    ///
    /// Returns the `RequestScheduled` event for the caller to emit once the
    /// transition is persisted.
    fn arm_next_tick(&mut self) -> DistributionEvent {
        let (index, total) = self
            .state
            .as_ref()
            .map_or((0, 0), |s| (s.current_index, s.total_requests()));
        let delay = index
            .checked_sub(1)
            .and_then(|i| self.delays.get(i))
            .unwrap_or(Duration::ZERO);

        self.cancel_pending();
        self.pending = Some(self.timer.post_delayed(delay));

        tracing::debug!(
            index,
            total,
            delay_ms = delay.as_millis() as u64,
            "Scheduled request {}/{}",
            index + 1,
            total
        );
        DistributionEvent::RequestScheduled {
            delay,
            index,
            total,
        }
    }

    fn complete(&mut self) {
        self.pending = None;
        let now = self.clock.now();
        if let Some(state) = self.state.as_mut() {
            state.is_running = false;
            state.is_paused = false;
            state.touch(now);
        }
        self.clear_persisted("complete");

        tracing::info!(total = self.current_index(), "Traffic distribution completed");
        self.emit(DistributionEvent::StatusChanged {
            running: false,
            progress: 100,
        });
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.timer.cancel(handle);
        }
    }

    fn persist(&mut self, operation: &str) {
        let now = self.clock.now();
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.touch(now);

        if let Err(e) = self.persistence.save(state) {
            tracing::warn!(
                operation,
                error = %e,
                "Failed to persist distribution state, continuing in memory"
            );
        }
    }

    fn clear_persisted(&mut self, operation: &str) {
        if let Err(e) = self.persistence.clear() {
            tracing::warn!(operation, error = %e, "Failed to clear saved distribution state");
        }
    }

    fn discard_corrupt(&mut self, error: &SchedulerError) {
        tracing::warn!(error = %error, "Discarding unreadable distribution state");
        self.clear_persisted("recover");
    }

    fn emit(&self, event: DistributionEvent) {
        self.listeners.emit(&event);
    }
}

impl std::fmt::Debug for DistributionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionScheduler")
            .field("phase", &self.phase())
            .field("spec", &self.spec)
            .field("current_index", &self.current_index())
            .field("pending", &self.pending)
            .field("listeners", &self.listeners)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
