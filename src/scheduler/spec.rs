//! Schedule specification types
//!
//! A [`ScheduleSpec`] is the immutable description of one delivery schedule:
//! how many requests, over which window, following which temporal pattern.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::{SchedulerError, SchedulerResult};

/// Longest window a schedule may span (100 years)
pub const MAX_DURATION_WINDOW: Duration = Duration::from_secs(100 * 365 * 86_400);

// ============================================================================
// Distribution Pattern
// ============================================================================

/// Temporal density shape requests follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPattern {
    /// Equal spacing across the whole window
    Uniform,
    /// Denser spacing inside the configured peak hours
    PeakWeighted,
}

impl DistributionPattern {
    /// Get all available patterns
    pub fn all() -> Vec<Self> {
        vec![Self::Uniform, Self::PeakWeighted]
    }

    /// Get pattern ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::PeakWeighted => "peak_weighted",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Uniform => "Uniform",
            Self::PeakWeighted => "Peak Hours",
        }
    }

    /// Try to parse from string
    pub fn from_id(id: &str) -> SchedulerResult<Self> {
        match id.to_lowercase().replace('-', "_").as_str() {
            "uniform" | "even" => Ok(Self::Uniform),
            "peak_weighted" | "peak" | "peak_hours" => Ok(Self::PeakWeighted),
            _ => Err(SchedulerError::invalid_schedule(format!(
                "Unknown pattern '{id}'. Valid options: uniform, peak_weighted"
            ))),
        }
    }
}

impl fmt::Display for DistributionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for DistributionPattern {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s)
    }
}

impl Default for DistributionPattern {
    fn default() -> Self {
        Self::Uniform
    }
}

// ============================================================================
// Peak Window
// ============================================================================

/// Hour-of-day range that receives proportionally more requests
///
/// The range is half-open, `[start_hour, end_hour)`, and wraps past midnight
/// when `end_hour < start_hour`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakWindow {
    /// First peak hour (0-23)
    pub start_hour: u8,

    /// First hour after the peak (0-23)
    pub end_hour: u8,

    /// Density multiplier inside the peak (>= 1.0)
    pub weight: f64,
}

impl PeakWindow {
    /// Create a new peak window
    pub fn new(start_hour: u8, end_hour: u8, weight: f64) -> Self {
        Self {
            start_hour,
            end_hour,
            weight,
        }
    }

    /// Check whether an hour of the day falls inside the peak
    pub fn contains(&self, hour: u32) -> bool {
        let start = u32::from(self.start_hour);
        let end = u32::from(self.end_hour);
        if start < end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    /// Number of peak hours per day
    pub fn len_hours(&self) -> u32 {
        (0..24).filter(|h| self.contains(*h)).count() as u32
    }

    /// Validate the window
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(SchedulerError::invalid_schedule(format!(
                "Peak hours must be 0-23, got {}-{}",
                self.start_hour, self.end_hour
            )));
        }
        if self.start_hour == self.end_hour {
            return Err(SchedulerError::invalid_schedule(
                "Peak window must not be empty (start hour equals end hour)",
            ));
        }
        if !self.weight.is_finite() || self.weight < 1.0 {
            return Err(SchedulerError::invalid_schedule(format!(
                "Peak weight must be a finite value >= 1.0, got {}",
                self.weight
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Jitter
// ============================================================================

/// Seeded random perturbation applied to every delay before renormalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Jitter {
    /// Maximum relative deviation, in `[0, 1)`
    pub ratio: f64,

    /// RNG seed; the same seed always yields the same sequence
    pub seed: u64,
}

impl Jitter {
    /// Validate the jitter settings
    pub fn validate(&self) -> SchedulerResult<()> {
        if !self.ratio.is_finite() || !(0.0..1.0).contains(&self.ratio) {
            return Err(SchedulerError::invalid_schedule(format!(
                "Jitter ratio must be in [0, 1), got {}",
                self.ratio
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Schedule Spec
// ============================================================================

/// Immutable description of a delivery schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// Number of requests to dispatch
    pub total_requests: usize,

    /// Window the requests are spread over
    pub duration_window: Duration,

    /// Temporal pattern
    pub pattern: DistributionPattern,

    /// Peak configuration, required for [`DistributionPattern::PeakWeighted`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak: Option<PeakWindow>,

    /// Optional seeded jitter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<Jitter>,
}

impl ScheduleSpec {
    /// Create a validated uniform schedule
    pub fn uniform(total_requests: usize, duration_window: Duration) -> SchedulerResult<Self> {
        Self::builder()
            .total_requests(total_requests)
            .duration_window(duration_window)
            .build()
    }

    /// Create a validated peak-weighted schedule
    pub fn peak_weighted(
        total_requests: usize,
        duration_window: Duration,
        peak: PeakWindow,
    ) -> SchedulerResult<Self> {
        Self::builder()
            .total_requests(total_requests)
            .duration_window(duration_window)
            .pattern(DistributionPattern::PeakWeighted)
            .peak(peak)
            .build()
    }

    /// Create a new spec builder
    pub fn builder() -> ScheduleSpecBuilder {
        ScheduleSpecBuilder::default()
    }

    /// Validate the specification
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.total_requests == 0 {
            return Err(SchedulerError::invalid_schedule(
                "total_requests must be greater than 0",
            ));
        }

        if self.duration_window.is_zero() {
            return Err(SchedulerError::invalid_schedule(
                "duration_window must be positive",
            ));
        }

        if self.duration_window > MAX_DURATION_WINDOW {
            return Err(SchedulerError::invalid_schedule(format!(
                "duration_window must not exceed {}s, got {}s",
                MAX_DURATION_WINDOW.as_secs(),
                self.duration_window.as_secs()
            )));
        }

        if self.pattern == DistributionPattern::PeakWeighted {
            match self.peak {
                Some(peak) => peak.validate()?,
                None => {
                    return Err(SchedulerError::invalid_schedule(
                        "peak_weighted pattern requires a peak window",
                    ))
                }
            }
        }

        if let Some(jitter) = self.jitter {
            jitter.validate()?;
        }

        Ok(())
    }

    /// Number of waits between consecutive requests
    pub fn interval_count(&self) -> usize {
        self.total_requests.saturating_sub(1)
    }

    /// Whether the delay sequence depends on the wall-clock start
    pub fn is_time_anchored(&self) -> bool {
        self.pattern == DistributionPattern::PeakWeighted
    }
}

/// Builder for ScheduleSpec
#[derive(Debug, Default)]
pub struct ScheduleSpecBuilder {
    total_requests: Option<usize>,
    duration_window: Option<Duration>,
    pattern: Option<DistributionPattern>,
    peak: Option<PeakWindow>,
    jitter: Option<Jitter>,
}

impl ScheduleSpecBuilder {
    /// Set total requests
    pub fn total_requests(mut self, total: usize) -> Self {
        self.total_requests = Some(total);
        self
    }

    /// Set duration window
    pub fn duration_window(mut self, window: Duration) -> Self {
        self.duration_window = Some(window);
        self
    }

    /// Set pattern
    pub fn pattern(mut self, pattern: DistributionPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Set peak window
    pub fn peak(mut self, peak: PeakWindow) -> Self {
        self.peak = Some(peak);
        self
    }

    /// Set jitter
    pub fn jitter(mut self, ratio: f64, seed: u64) -> Self {
        self.jitter = Some(Jitter { ratio, seed });
        self
    }

    /// Build the spec
    pub fn build(self) -> SchedulerResult<ScheduleSpec> {
        let spec = ScheduleSpec {
            total_requests: self.total_requests.unwrap_or(0),
            duration_window: self.duration_window.unwrap_or_default(),
            pattern: self.pattern.unwrap_or_default(),
            peak: self.peak,
            jitter: self.jitter,
        };
        spec.validate()?;
        Ok(spec)
    }
}
