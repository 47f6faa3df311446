//! Union length of possibly overlapping time intervals.
//!
//! A batch's steps often run in parallel (a transfer overlapping the next
//! heating phase), so summing step durations double counts. The functions
//! here merge the intervals first and measure the union instead.
//!
//! Two intervals are merged only when the next one starts strictly before the
//! current one ends. Intervals that merely touch (`next.start == current.end`)
//! stay separate spans; the union length is the same either way.

use crate::error::InvalidIntervalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in one minute.
pub const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// A time interval in milliseconds since an arbitrary epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Interval { start, end }
    }

    pub fn from_datetimes(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Self {
        Interval {
            start: start.timestamp_millis() as f64,
            end: end.timestamp_millis() as f64,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_ms() / MILLIS_PER_MINUTE
    }

    /// Check that both bounds are finite and `end >= start`.
    ///
    /// `index` is the position reported in the error.
    pub fn validate(&self, index: usize) -> Result<(), InvalidIntervalError> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(InvalidIntervalError::NonFinite {
                index,
                start: self.start,
                end: self.end,
            });
        }
        if self.end < self.start {
            return Err(InvalidIntervalError::Reversed {
                index,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Totals describing how a set of intervals covers its wall-clock span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalSummary {
    /// Merged spans in ascending order.
    pub spans: Vec<Interval>,
    /// Uncovered stretches between consecutive spans, positive length only.
    pub gaps: Vec<Interval>,
    /// First start to last end.
    pub wall_minutes: f64,
    /// Length of the union.
    pub merged_minutes: f64,
    /// Plain sum of the input durations.
    pub naive_minutes: f64,
    /// Time counted more than once by the plain sum.
    pub overlap_minutes: f64,
    /// Time inside the wall-clock span covered by no interval.
    pub idle_minutes: f64,
    pub max_gap_minutes: f64,
}

fn validated_copy(intervals: &[Interval]) -> Result<Vec<Interval>, InvalidIntervalError> {
    for (index, interval) in intervals.iter().enumerate() {
        interval.validate(index)?;
    }
    let mut sorted = intervals.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(sorted)
}

/// Merge overlapping intervals into ascending, non-overlapping spans.
///
/// The input slice is left untouched.
pub fn merge_intervals(intervals: &[Interval]) -> Result<Vec<Interval>, InvalidIntervalError> {
    let sorted = validated_copy(intervals)?;
    let mut iter = sorted.into_iter();
    let Some(mut current) = iter.next() else {
        return Ok(Vec::new());
    };

    let mut merged = Vec::new();
    for next in iter {
        if next.start < current.end {
            current.end = current.end.max(next.end);
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    Ok(merged)
}

/// Total wall-clock minutes covered by at least one interval.
///
/// # Example
///
/// ```rust
/// use brew_core::interval::{merged_duration_minutes, Interval};
///
/// let steps = [Interval::new(0.0, 100.0), Interval::new(50.0, 150.0)];
/// let minutes = merged_duration_minutes(&steps).unwrap();
/// assert!((minutes - 150.0 / 60_000.0).abs() < 1e-12);
/// ```
pub fn merged_duration_minutes(intervals: &[Interval]) -> Result<f64, InvalidIntervalError> {
    let merged = merge_intervals(intervals)?;
    Ok(merged.iter().map(Interval::duration_ms).sum::<f64>() / MILLIS_PER_MINUTE)
}

fn gaps_between(spans: &[Interval]) -> Vec<Interval> {
    spans
        .windows(2)
        .filter(|pair| pair[1].start > pair[0].end)
        .map(|pair| Interval::new(pair[0].end, pair[1].start))
        .collect()
}

/// Idle gaps between the merged spans, in ascending order.
pub fn idle_gaps(intervals: &[Interval]) -> Result<Vec<Interval>, InvalidIntervalError> {
    Ok(gaps_between(&merge_intervals(intervals)?))
}

/// Merge the intervals and report wall, merged, naive, overlap and idle minutes.
pub fn summarize(intervals: &[Interval]) -> Result<IntervalSummary, InvalidIntervalError> {
    let spans = merge_intervals(intervals)?;
    let gaps = gaps_between(&spans);

    let wall_minutes = match (spans.first(), spans.last()) {
        (Some(first), Some(last)) => (last.end - first.start) / MILLIS_PER_MINUTE,
        _ => 0.0,
    };
    let merged_minutes = spans.iter().map(Interval::duration_minutes).sum::<f64>();
    let naive_minutes = intervals.iter().map(Interval::duration_minutes).sum::<f64>();
    let idle_minutes = gaps.iter().map(Interval::duration_minutes).sum::<f64>();
    let max_gap_minutes = gaps
        .iter()
        .map(Interval::duration_minutes)
        .fold(0.0, f64::max);

    Ok(IntervalSummary {
        wall_minutes,
        merged_minutes,
        naive_minutes,
        overlap_minutes: (naive_minutes - merged_minutes).max(0.0),
        idle_minutes,
        max_gap_minutes,
        spans,
        gaps,
    })
}
