use chrono::TimeZone;
use thiserror::Error;

use crate::observation::epoch_seconds;
use crate::timeline::{hour_of_day, seconds_to_next_hour, Timeline};

/// Longest expected spacing between two consecutive plays while the
/// collector is running. A wider gap means collection was down.
pub const DEFAULT_GAP_THRESHOLD_SECS: i64 = 12 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoverageError {
    #[error("Interval is misconfigured: ends at {end} before it starts at {start}")]
    InvalidInterval { start: i64, end: i64 },
    #[error("Intervals out of order: interval starting at {start} overlaps previous end {previous_end}")]
    Unordered { previous_end: i64, start: i64 },
}

/// A closed span `[start, end]` of unix seconds during which plays were
/// being captured without an outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInterval {
    pub start: i64,
    pub end: i64,
}

impl CaptureInterval {
    pub fn point(at: i64) -> Self {
        Self { start: at, end: at }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, at: i64) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Capture intervals of a timeline.
///
/// An empty timeline has no intervals; a single play gives one zero-length
/// interval.
pub fn capture_intervals(timeline: &Timeline, gap_threshold_secs: i64) -> Vec<CaptureInterval> {
    intervals_from_timestamps(timeline.timestamps(), gap_threshold_secs)
}

/// Group timestamps into disjoint, ascending intervals.
///
/// Timestamps are truncated to whole seconds and sorted. A timestamp at
/// most `gap_threshold_secs` after the current interval's end extends it;
/// anything later starts a new interval. A negative threshold counts as 0.
pub fn intervals_from_timestamps(
    timestamps: impl IntoIterator<Item = f64>,
    gap_threshold_secs: i64,
) -> Vec<CaptureInterval> {
    let gap_threshold_secs = gap_threshold_secs.max(0);
    let mut secs: Vec<i64> = timestamps.into_iter().map(epoch_seconds).collect();
    secs.sort_unstable();

    let mut intervals = Vec::new();
    let mut current: Option<CaptureInterval> = None;

    for ts in secs {
        if let Some(interval) = current.as_mut() {
            if ts <= interval.end.saturating_add(gap_threshold_secs) {
                interval.end = ts;
                continue;
            }
            // Gap too wide: close this interval
            intervals.push(*interval);
        }
        current = Some(CaptureInterval::point(ts));
    }

    // Don't forget the open interval
    if let Some(interval) = current {
        intervals.push(interval);
    }

    intervals
}

/// Total seconds spanned by `intervals`.
///
/// Fails if an interval ends before it starts or if intervals overlap or
/// are out of order.
pub fn total_covered_seconds(intervals: &[CaptureInterval]) -> Result<i64, CoverageError> {
    let mut total = 0;
    let mut previous_end: Option<i64> = None;

    for interval in intervals {
        if interval.end < interval.start {
            return Err(CoverageError::InvalidInterval {
                start: interval.start,
                end: interval.end,
            });
        }
        if let Some(prev) = previous_end {
            if interval.start <= prev {
                return Err(CoverageError::Unordered {
                    previous_end: prev,
                    start: interval.start,
                });
            }
        }
        previous_end = Some(interval.end);
        total += interval.duration_secs();
    }

    Ok(total)
}

/// Seconds of true observation time behind a timeline.
pub fn capture_length(timeline: &Timeline, gap_threshold_secs: i64) -> Result<i64, CoverageError> {
    total_covered_seconds(&capture_intervals(timeline, gap_threshold_secs))
}

/// Split covered time across the 24 hours of the day in `tz`.
///
/// Index `h` holds how many observed seconds fell within hour `h` of any day.
pub fn covered_seconds_by_hour<Tz: TimeZone>(intervals: &[CaptureInterval], tz: &Tz) -> [i64; 24] {
    let mut by_hour = [0i64; 24];

    for interval in intervals {
        let mut cursor = interval.start;
        while cursor < interval.end {
            let step = seconds_to_next_hour(cursor, tz).min(interval.end - cursor);
            let hour = hour_of_day(cursor as f64, tz) as usize;
            by_hour[hour] += step;
            cursor += step;
        }
    }

    by_hour
}
