use std::time::Duration;
use tracing::debug;

use crate::domain::query::model::TimeRange;

const SECOND: u64 = 1;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const YEAR: u64 = 365 * DAY;

/// Ascending bucket widths (seconds) that histogram intervals snap to.
const NICE_INTERVALS_SECS: [u64; 23] = [
    SECOND,
    2 * SECOND,
    5 * SECOND,
    10 * SECOND,
    15 * SECOND,
    20 * SECOND,
    30 * SECOND,
    MINUTE,
    2 * MINUTE,
    5 * MINUTE,
    10 * MINUTE,
    15 * MINUTE,
    20 * MINUTE,
    30 * MINUTE,
    HOUR,
    2 * HOUR,
    3 * HOUR,
    6 * HOUR,
    12 * HOUR,
    DAY,
    7 * DAY,
    30 * DAY,
    YEAR,
];

pub const DEFAULT_TARGET_POINTS: u32 = 120;

/// Picks histogram bucket widths. Holds only configuration, so one value is
/// shared by every dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalCalculator {
    min_interval: Duration,
    target_points: u32,
}

impl Default for IntervalCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), DEFAULT_TARGET_POINTS)
    }
}

impl IntervalCalculator {
    /// `min_interval` is floored at the smallest table entry (1s).
    pub fn new(min_interval: Duration, target_points: u32) -> Self {
        Self {
            min_interval: min_interval.max(Duration::from_secs(NICE_INTERVALS_SECS[0])),
            target_points: target_points.max(1),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn target_points(&self) -> u32 {
        self.target_points
    }

    /// Interval for a range using the configured target point count.
    pub fn calculate(&self, range: &TimeRange, hint: Option<Duration>) -> Duration {
        self.compute(range, hint, self.target_points)
    }

    /// A hint at or above the minimum is returned as is. Otherwise the range is
    /// divided by `target_points` and rounded up to the next nice width.
    pub fn compute(&self, range: &TimeRange, hint: Option<Duration>, target_points: u32) -> Duration {
        if let Some(hint) = hint {
            if hint >= self.min_interval {
                return hint;
            }
            debug!(
                "Ignoring interval hint {:?} below minimum {:?}",
                hint, self.min_interval
            );
        }

        let span = range.duration();
        if span.is_zero() {
            return self.min_interval;
        }

        let raw = span / target_points.max(1);
        round_up_to_nice(raw).max(self.min_interval)
    }
}

/// Smallest nice width >= `raw`; past the table, whole multiples of a year.
fn round_up_to_nice(raw: Duration) -> Duration {
    if let Some(secs) = NICE_INTERVALS_SECS
        .iter()
        .copied()
        .find(|&secs| Duration::from_secs(secs) >= raw)
    {
        return Duration::from_secs(secs);
    }

    let years = raw.as_secs().div_ceil(YEAR).max(1);
    Duration::from_secs(years * YEAR)
}
