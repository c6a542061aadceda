//! Distribution state and status snapshots
//!
//! [`DistributionState`] is the only mutable record of a run. The scheduler
//! owns the in-memory copy and mirrors it to a
//! [`PersistenceAdapter`](super::persistence::PersistenceAdapter) after every
//! transition, so a restarted process can pick the run up where it stopped.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::calculator::{self, DelaySequence};
use super::error::{SchedulerError, SchedulerResult};
use super::spec::{DistributionPattern, ScheduleSpec};

// ============================================================================
// Scheduler Phase
// ============================================================================

/// Lifecycle phase of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPhase {
    /// No active run
    Idle,
    /// Ticking
    Running,
    /// Holding position until resumed
    Paused,
}

impl SchedulerPhase {
    /// Get phase as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }

    /// Whether a run is active (running or paused)
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for SchedulerPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Percentage of `total` represented by `index`, floored
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((index.min(total) as u128 * 100) / total as u128) as u8
}

// ============================================================================
// Distribution State
// ============================================================================

/// Serializable record of an in-progress run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionState {
    /// Schedule being executed
    pub spec: ScheduleSpec,

    /// Requests dispatched so far
    pub current_index: usize,

    /// When the run was started
    pub started_at: DateTime<Utc>,

    /// Whether the run is ticking
    pub is_running: bool,

    /// Whether the run is paused
    pub is_paused: bool,

    /// Last transition time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl DistributionState {
    /// Create the state for a fresh run
    pub fn new(spec: ScheduleSpec, started_at: DateTime<Utc>) -> Self {
        Self {
            spec,
            current_index: 0,
            started_at,
            is_running: true,
            is_paused: false,
            updated_at: started_at,
        }
    }

    /// Total requests in the run
    pub fn total_requests(&self) -> usize {
        self.spec.total_requests
    }

    /// Derived lifecycle phase
    pub fn phase(&self) -> SchedulerPhase {
        match (self.is_running, self.is_paused) {
            (true, _) => SchedulerPhase::Running,
            (false, true) => SchedulerPhase::Paused,
            (false, false) => SchedulerPhase::Idle,
        }
    }

    /// Current progress (0-100)
    pub fn progress(&self) -> u8 {
        progress_percent(self.current_index, self.total_requests())
    }

    /// Requests not yet dispatched
    pub fn remaining_requests(&self) -> usize {
        self.total_requests().saturating_sub(self.current_index)
    }

    /// Whether every request has been dispatched
    pub fn is_complete(&self) -> bool {
        self.current_index >= self.total_requests()
    }

    /// Time until the last request, counting the pending wait in full
    pub fn remaining_time(&self, delays: &DelaySequence) -> Duration {
        if self.phase().is_active() {
            delays.remaining_from(self.current_index.saturating_sub(1))
        } else {
            Duration::ZERO
        }
    }

    /// Started-at in local time, the anchor used for peak placement
    pub fn local_start(&self) -> DateTime<Local> {
        self.started_at.with_timezone(&Local)
    }

    /// Mark a transition at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Check the record is internally consistent
    pub fn validate(&self) -> SchedulerResult<()> {
        self.spec
            .validate()
            .map_err(|e| SchedulerError::corrupt(format!("embedded schedule: {e}")))?;

        if self.is_running && self.is_paused {
            return Err(SchedulerError::corrupt(
                "state is both running and paused",
            ));
        }

        if self.current_index > self.total_requests() {
            return Err(SchedulerError::corrupt(format!(
                "current index {} exceeds total requests {}",
                self.current_index,
                self.total_requests()
            )));
        }

        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> SchedulerResult<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }
}

// ============================================================================
// Status Snapshot
// ============================================================================

/// Point-in-time view of the scheduler, for dashboards and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct DistributionStatus {
    pub phase: SchedulerPhase,
    pub progress: u8,
    pub current_index: usize,
    pub total_requests: usize,
    pub pattern: Option<DistributionPattern>,
    pub started_at: Option<DateTime<Utc>>,
    pub remaining: Duration,
    pub estimated_completion: DateTime<Utc>,
}

impl DistributionStatus {
    /// Snapshot of a run, e.g. one loaded from storage
    pub fn from_state(
        state: &DistributionState,
        delays: &DelaySequence,
        now: DateTime<Utc>,
    ) -> Self {
        let remaining = state.remaining_time(delays);
        Self {
            phase: state.phase(),
            progress: state.progress(),
            current_index: state.current_index,
            total_requests: state.total_requests(),
            pattern: Some(state.spec.pattern),
            started_at: Some(state.started_at),
            remaining,
            estimated_completion: calculator::shift(&now, remaining)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Distribution Status\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("State: {}\n", self.phase));
        output.push_str(&format!(
            "Progress: {}% ({}/{})\n",
            self.progress, self.current_index, self.total_requests
        ));

        if let Some(pattern) = self.pattern {
            output.push_str(&format!("Pattern: {}\n", pattern.display_name()));
        }

        if let Some(started_at) = self.started_at {
            output.push_str(&format!(
                "Started: {}\n",
                started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ));
        }

        let secs = self.remaining.as_secs();
        output.push_str(&format!(
            "Remaining: {}h {}m {}s\n",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        ));
        output.push_str(&format!(
            "Estimated Completion: {}\n",
            self.estimated_completion
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> DistributionState {
        let spec = ScheduleSpec::uniform(8, Duration::from_secs(70)).unwrap();
        DistributionState::new(spec, Utc::now())
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 5), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(5, 5), 100);
        assert_eq!(progress_percent(7, 5), 100);
        assert_eq!(progress_percent(3, 0), 0);
    }

    #[test]
    fn test_new_state_is_running() {
        let state = sample_state();
        assert_eq!(state.phase(), SchedulerPhase::Running);
        assert_eq!(state.current_index, 0);
        assert_eq!(state.progress(), 0);
        assert_eq!(state.remaining_requests(), 8);
        assert!(!state.is_complete());
    }

    #[test]
    fn test_phase_derivation() {
        let mut state = sample_state();

        state.is_running = false;
        state.is_paused = true;
        assert_eq!(state.phase(), SchedulerPhase::Paused);

        state.is_paused = false;
        assert_eq!(state.phase(), SchedulerPhase::Idle);
        assert!(!state.phase().is_active());
    }

    #[test]
    fn test_validate_rejects_running_and_paused() {
        let mut state = sample_state();
        state.is_paused = true;
        assert!(matches!(
            state.validate(),
            Err(SchedulerError::RecoveryDataCorrupt { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_index_overflow() {
        let mut state = sample_state();
        state.current_index = 9;
        assert!(state.validate().is_err());

        state.current_index = 8;
        assert!(state.validate().is_ok());
        assert!(state.is_complete());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut state = sample_state();
        state.current_index = 3;
        state.is_running = false;
        state.is_paused = true;

        let json = state.to_json().unwrap();
        let restored = DistributionState::from_json(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_remaining_time() {
        let mut state = sample_state();
        let delays = DelaySequence::from_millis([10_000; 7]);

        state.current_index = 3;
        assert_eq!(state.remaining_time(&delays), Duration::from_secs(50));

        state.is_running = false;
        state.is_paused = true;
        assert_eq!(state.remaining_time(&delays), Duration::from_secs(50));

        state.is_paused = false;
        assert_eq!(state.remaining_time(&delays), Duration::ZERO);
    }

    #[test]
    fn test_status_from_state() {
        let mut state = sample_state();
        state.current_index = 2;
        let delays = DelaySequence::from_millis([10_000; 7]);
        let now = Utc::now();

        let status = DistributionStatus::from_state(&state, &delays, now);
        assert_eq!(status.phase, SchedulerPhase::Running);
        assert_eq!(status.progress, 25);
        assert_eq!(status.remaining, Duration::from_secs(60));
        assert_eq!(
            status.estimated_completion,
            now + chrono::Duration::seconds(60)
        );
    }

    #[test]
    fn test_status_display() {
        let status = DistributionStatus {
            phase: SchedulerPhase::Paused,
            progress: 40,
            current_index: 2,
            total_requests: 5,
            pattern: Some(DistributionPattern::Uniform),
            started_at: Some(Utc::now()),
            remaining: Duration::from_secs(3725),
            estimated_completion: Utc::now(),
        };

        let output = status.display();
        assert!(output.contains("State: paused"));
        assert!(output.contains("40% (2/5)"));
        assert!(output.contains("Remaining: 1h 2m 5s"));
    }
}
