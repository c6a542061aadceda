//! Delay sequence computation
//!
//! Turns a [`ScheduleSpec`] into the ordered list of waits between
//! consecutive requests. Computation is pure: the same spec and anchor always
//! produce the same sequence, which is what lets a recovered run continue on
//! exactly the timeline it was started with.
//!
//! Every sequence is carried at millisecond resolution and sums to the
//! configured window exactly.

use chrono::{DateTime, TimeZone, Timelike};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::SchedulerResult;
use super::spec::{DistributionPattern, Jitter, PeakWindow, ScheduleSpec};

// ============================================================================
// Delay Sequence
// ============================================================================

/// Ordered waits between consecutive requests
///
/// Entry `i` is the wait between dispatching request `i` and request `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelaySequence {
    delays: Vec<Duration>,
}

impl DelaySequence {
    /// Build a sequence from millisecond values
    pub fn from_millis(millis: impl IntoIterator<Item = u64>) -> Self {
        Self {
            delays: millis.into_iter().map(Duration::from_millis).collect(),
        }
    }

    /// Number of waits
    pub fn len(&self) -> usize {
        self.delays.len()
    }

    /// Whether there are no waits (zero or one request)
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Wait at a given position
    pub fn get(&self, index: usize) -> Option<Duration> {
        self.delays.get(index).copied()
    }

    /// Iterate over the waits
    pub fn iter(&self) -> impl Iterator<Item = Duration> + '_ {
        self.delays.iter().copied()
    }

    /// Sum of all waits
    pub fn total(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Sum of the waits from `index` onwards
    pub fn remaining_from(&self, index: usize) -> Duration {
        self.delays.iter().skip(index).sum()
    }

    /// Offset of every request from the first one (request 0 is at zero)
    pub fn offsets(&self) -> Vec<Duration> {
        let mut offsets = Vec::with_capacity(self.delays.len() + 1);
        let mut elapsed = Duration::ZERO;
        offsets.push(elapsed);
        for delay in &self.delays {
            elapsed += *delay;
            offsets.push(elapsed);
        }
        offsets
    }

    /// Number of dispatches landing in each hour of the day, given a start
    pub fn hourly_histogram<Tz: TimeZone>(&self, start: &DateTime<Tz>) -> [usize; 24] {
        let mut histogram = [0usize; 24];
        for offset in self.offsets() {
            if let Some(at) = shift(start, offset) {
                histogram[at.hour() as usize] += 1;
            }
        }
        histogram
    }

    /// Shortest and longest wait
    pub fn bounds(&self) -> Option<(Duration, Duration)> {
        let min = self.delays.iter().min()?;
        let max = self.delays.iter().max()?;
        Some((*min, *max))
    }
}

// ============================================================================
// Calculator
// ============================================================================

/// Compute the delay sequence for a schedule
///
/// `anchor` is the intended start of the run. It only matters for
/// [`DistributionPattern::PeakWeighted`], where peak placement depends on the
/// wall-clock hour each request lands in; hours are read in the anchor's time
/// zone.
pub fn compute<Tz: TimeZone>(
    spec: &ScheduleSpec,
    anchor: &DateTime<Tz>,
) -> SchedulerResult<DelaySequence> {
    spec.validate()?;

    let intervals = spec.interval_count();
    if intervals == 0 {
        return Ok(DelaySequence::default());
    }

    let window_ms = window_millis(spec.duration_window);

    let weights = match (spec.pattern, spec.peak) {
        (DistributionPattern::PeakWeighted, Some(peak)) => {
            peak_weights(&peak, intervals, window_ms, anchor)
        }
        _ => {
            if spec.jitter.is_none() {
                return Ok(uniform(intervals, window_ms));
            }
            vec![1.0; intervals]
        }
    };

    let weights = match spec.jitter {
        Some(jitter) => apply_jitter(weights, &jitter),
        None => weights,
    };

    Ok(DelaySequence::from_millis(apportion(&weights, window_ms)))
}

/// Equal shares with the rounding remainder spread over the first waits
fn uniform(intervals: usize, window_ms: u64) -> DelaySequence {
    let n = intervals as u64;
    let base = window_ms / n;
    let remainder = window_ms % n;

    DelaySequence::from_millis((0..n).map(|i| base + u64::from(i < remainder)))
}

/// Relative weight of every wait under a peak window
///
/// A wait is shortened by `1 / weight` when the nominal (uniform) target time
/// of the request it leads to falls inside the peak.
fn peak_weights<Tz: TimeZone>(
    peak: &PeakWindow,
    intervals: usize,
    window_ms: u64,
    anchor: &DateTime<Tz>,
) -> Vec<f64> {
    let n = intervals as u128;
    (1..=intervals)
        .map(|next| {
            let nominal_ms = (u128::from(window_ms) * next as u128 / n) as u64;
            // Targets past the last representable instant count as off-peak
            let target = shift(anchor, Duration::from_millis(nominal_ms));
            if target.is_some_and(|t| peak.contains(t.hour())) {
                1.0 / peak.weight
            } else {
                1.0
            }
        })
        .collect()
}

fn apply_jitter(weights: Vec<f64>, jitter: &Jitter) -> Vec<f64> {
    if jitter.ratio == 0.0 {
        return weights;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(jitter.seed);
    weights
        .into_iter()
        .map(|w| w * rng.gen_range((1.0 - jitter.ratio)..=(1.0 + jitter.ratio)))
        .collect()
}

/// Split `total_ms` proportionally to `weights`, summing exactly to `total_ms`
///
/// Rounds cumulative boundaries rather than individual shares so that every
/// share stays non-negative and the last boundary lands on the total.
fn apportion(weights: &[f64], total_ms: u64) -> Vec<u64> {
    let sum: f64 = weights.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return uniform(weights.len(), total_ms)
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut cumulative = 0.0;
    let mut previous = 0u64;

    for (i, weight) in weights.iter().enumerate() {
        cumulative += weight;
        let boundary = if i + 1 == weights.len() {
            total_ms
        } else {
            ((total_ms as f64 * cumulative / sum).round() as u64).clamp(previous, total_ms)
        };
        shares.push(boundary - previous);
        previous = boundary;
    }

    shares
}

fn window_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

/// `at + by`, or `None` when the result is out of chrono's range
pub(crate) fn shift<Tz: TimeZone>(at: &DateTime<Tz>, by: Duration) -> Option<DateTime<Tz>> {
    let by = chrono::Duration::from_std(by).ok()?;
    at.clone().checked_add_signed(by)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::spec::PeakWindow;
    use chrono::Utc;

    fn anchor_at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_uniform_even_split() {
        let spec = ScheduleSpec::uniform(5, Duration::from_secs(10)).unwrap();
        let delays = compute(&spec, &anchor_at(0)).unwrap();

        assert_eq!(delays.len(), 4);
        assert!(delays.iter().all(|d| d == Duration::from_millis(2500)));
        assert_eq!(delays.total(), Duration::from_secs(10));
    }

    #[test]
    fn test_uniform_remainder_goes_first() {
        let spec = ScheduleSpec::uniform(4, Duration::from_millis(10)).unwrap();
        let delays = compute(&spec, &anchor_at(0)).unwrap();

        let millis: Vec<u128> = delays.iter().map(|d| d.as_millis()).collect();
        assert_eq!(millis, vec![4, 3, 3]);
    }

    #[test]
    fn test_single_request_has_no_waits() {
        let spec = ScheduleSpec::uniform(1, Duration::from_secs(60)).unwrap();
        let delays = compute(&spec, &anchor_at(0)).unwrap();
        assert!(delays.is_empty());
        assert_eq!(delays.total(), Duration::ZERO);
    }

    #[test]
    fn test_remaining_from() {
        let delays = DelaySequence::from_millis([100, 200, 300]);
        assert_eq!(delays.remaining_from(0), Duration::from_millis(600));
        assert_eq!(delays.remaining_from(2), Duration::from_millis(300));
        assert_eq!(delays.remaining_from(3), Duration::ZERO);
        assert_eq!(delays.remaining_from(10), Duration::ZERO);
    }

    #[test]
    fn test_offsets() {
        let delays = DelaySequence::from_millis([100, 200]);
        assert_eq!(
            delays.offsets(),
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300)
            ]
        );
    }

    #[test]
    fn test_peak_weighted_preserves_window() {
        let spec = ScheduleSpec::peak_weighted(
            100,
            Duration::from_secs(86_400),
            PeakWindow::new(18, 22, 3.0),
        )
        .unwrap();
        let delays = compute(&spec, &anchor_at(19)).unwrap();

        assert_eq!(delays.len(), 99);
        assert_eq!(delays.total(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_peak_weighted_density_ratio() {
        let spec = ScheduleSpec::peak_weighted(
            97,
            Duration::from_secs(86_400),
            PeakWindow::new(18, 22, 3.0),
        )
        .unwrap();
        let delays = compute(&spec, &anchor_at(0)).unwrap();
        let (min, max) = delays.bounds().unwrap();

        // Peak waits are a third of off-peak waits, give or take a millisecond
        let ratio = max.as_secs_f64() / min.as_secs_f64();
        assert!((ratio - 3.0).abs() < 0.01, "ratio was {ratio}");
    }

    #[test]
    fn test_peak_weighted_clusters_inside_peak() {
        let window = Duration::from_secs(86_400);
        let start = anchor_at(18);

        let uniform_spec = ScheduleSpec::uniform(240, window).unwrap();
        let peak_spec =
            ScheduleSpec::peak_weighted(240, window, PeakWindow::new(18, 22, 3.0)).unwrap();

        let uniform_hist = compute(&uniform_spec, &start)
            .unwrap()
            .hourly_histogram(&start);
        let peak_hist = compute(&peak_spec, &start).unwrap().hourly_histogram(&start);

        let in_peak = |h: &[usize; 24]| h[18] + h[19] + h[20] + h[21];
        assert!(in_peak(&peak_hist) > in_peak(&uniform_hist));
        assert_eq!(peak_hist.iter().sum::<usize>(), 240);
    }

    #[test]
    fn test_peak_weighted_wrapping_window() {
        let spec = ScheduleSpec::peak_weighted(
            49,
            Duration::from_secs(86_400),
            PeakWindow::new(22, 2, 2.0),
        )
        .unwrap();
        let start = anchor_at(12);
        let hist = compute(&spec, &start).unwrap().hourly_histogram(&start);

        let night = hist[22] + hist[23] + hist[0] + hist[1];
        let midday = hist[12] + hist[13] + hist[14] + hist[15];
        assert!(night > midday, "night={night} midday={midday}");
    }

    #[test]
    fn test_peak_weighted_depends_on_anchor() {
        let spec = ScheduleSpec::peak_weighted(
            50,
            Duration::from_secs(6 * 3600),
            PeakWindow::new(18, 22, 3.0),
        )
        .unwrap();

        let inside = compute(&spec, &anchor_at(18)).unwrap();
        let outside = compute(&spec, &anchor_at(6)).unwrap();

        assert_ne!(inside, outside);

        // Entirely off-peak degenerates to a uniform split
        let (min, max) = outside.bounds().unwrap();
        assert!(max - min <= Duration::from_millis(1));
    }

    #[test]
    fn test_jitter_is_deterministic() {
        let spec = ScheduleSpec::builder()
            .total_requests(20)
            .duration_window(Duration::from_secs(600))
            .jitter(0.4, 42)
            .build()
            .unwrap();

        let first = compute(&spec, &anchor_at(0)).unwrap();
        let second = compute(&spec, &anchor_at(5)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.total(), Duration::from_secs(600));

        let (min, max) = first.bounds().unwrap();
        assert!(max > min);
    }

    #[test]
    fn test_jitter_seed_changes_sequence() {
        let build = |seed| {
            ScheduleSpec::builder()
                .total_requests(20)
                .duration_window(Duration::from_secs(600))
                .jitter(0.4, seed)
                .build()
                .unwrap()
        };

        let a = compute(&build(1), &anchor_at(0)).unwrap();
        let b = compute(&build(2), &anchor_at(0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_apportion_exact_sum() {
        let shares = apportion(&[1.0, 2.0, 3.0, 0.5], 1001);
        assert_eq!(shares.iter().sum::<u64>(), 1001);
        assert_eq!(shares.len(), 4);
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let spec = ScheduleSpec {
            total_requests: 5,
            duration_window: Duration::ZERO,
            pattern: DistributionPattern::Uniform,
            peak: None,
            jitter: None,
        };
        assert!(compute(&spec, &anchor_at(0)).is_err());
    }

    #[test]
    fn test_oversized_peak_window_is_an_error() {
        let spec = ScheduleSpec {
            total_requests: 3,
            duration_window: Duration::from_secs(10u64.pow(16)),
            pattern: DistributionPattern::PeakWeighted,
            peak: Some(PeakWindow::new(18, 22, 3.0)),
            jitter: None,
        };
        assert!(matches!(
            compute(&spec, &anchor_at(9)),
            Err(crate::scheduler::SchedulerError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_shift_out_of_range() {
        let late = DateTime::<Utc>::MAX_UTC - chrono::Duration::hours(1);
        assert!(shift(&late, Duration::from_secs(60)).is_some());
        assert!(shift(&late, Duration::from_secs(7200)).is_none());
        assert!(shift(&anchor_at(0), Duration::from_secs(10u64.pow(16))).is_none());
    }

    #[test]
    fn test_histogram_skips_unrepresentable_offsets() {
        let late = DateTime::<Utc>::MAX_UTC - chrono::Duration::minutes(30);
        let delays = DelaySequence::from_millis([60_000, 3_600_000]);

        let histogram = delays.hourly_histogram(&late);
        assert_eq!(histogram.iter().sum::<usize>(), 2);
    }
}
