//! Sync window, segment grid and freshness definitions.
//!
//! This module defines [`SyncWindow`], the time horizon a run covers, and
//! [`SegmentGrid`], the fixed-period segmentation of time the provider lists
//! programs in. Segment boundaries are aligned to the Unix epoch, which makes
//! every grid with a period dividing 24 hours start at midnight UTC.

use chrono::{DateTime, Days, TimeDelta, TimeZone, Utc};

use crate::error::{EpgError, Result};

/// Default segment period used by the provider.
pub const DEFAULT_SEGMENT_HOURS: u32 = 6;

/// The freshness rule for a cached segment.
///
/// A segment is fresh once it has been fetched and its start lies in the past:
/// aired listings cannot change anymore. Segments starting at or after `now`
/// are never fresh and are refetched on every sync.
#[must_use]
pub fn segment_is_fresh(
    fetched_at: Option<DateTime<Utc>>,
    segment_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    fetched_at.is_some() && segment_start < now
}

/// A half-open time range `[start, end)` a run is asked to cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SyncWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SyncWindow {
    /// Creates a window from explicit bounds.
    ///
    /// # Errors
    /// Returns [`EpgError::InvalidParameter`] if `start` is not before `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(EpgError::InvalidParameter(format!(
                "Window start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Creates a window of `scan_days` whole days starting at midnight UTC of `now`.
    ///
    /// # Errors
    /// Returns [`EpgError::InvalidParameter`] if `scan_days` is zero or the end
    /// would overflow the calendar.
    pub fn for_days(now: DateTime<Utc>, scan_days: u32) -> Result<Self> {
        if scan_days == 0 {
            return Err(EpgError::InvalidParameter(
                "scan_days must be at least 1".to_string(),
            ));
        }
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .ok_or_else(|| EpgError::InvalidParameter(format!("Invalid date for {}", now)))?;
        let end = midnight
            .checked_add_days(Days::new(u64::from(scan_days)))
            .ok_or_else(|| EpgError::InvalidParameter(format!("{} days overflows", scan_days)))?;
        Self::new(midnight, end)
    }

    /// Start of the window (inclusive).
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the window (exclusive).
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns true if `t` falls inside the window.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Fixed-period segmentation of time, aligned to the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentGrid {
    period: TimeDelta,
}

impl SegmentGrid {
    /// Creates a grid with a period of `hours`.
    ///
    /// # Errors
    /// Returns [`EpgError::InvalidParameter`] unless `hours` evenly divides a day,
    /// since only those periods keep boundaries on midnight UTC.
    pub fn from_hours(hours: u32) -> Result<Self> {
        if hours == 0 || 24 % hours != 0 {
            return Err(EpgError::InvalidParameter(format!(
                "Segment period of {} hours does not divide a day",
                hours
            )));
        }
        Ok(Self {
            period: TimeDelta::hours(i64::from(hours)),
        })
    }

    /// Returns the segment period.
    #[must_use]
    pub const fn period(&self) -> TimeDelta {
        self.period
    }

    /// Returns the start of the segment containing `t`.
    #[must_use]
    pub fn align_down(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period.num_seconds();
        let secs = t.timestamp();
        let aligned = secs - secs.rem_euclid(period);
        Utc.timestamp_opt(aligned, 0).single().unwrap_or(t)
    }

    /// Returns the first segment boundary at or after `t`.
    #[must_use]
    pub fn align_up(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let down = self.align_down(t);
        if down == t { down } else { down + self.period }
    }

    /// Returns true if `t` lies exactly on a segment boundary.
    #[must_use]
    pub fn is_aligned(&self, t: DateTime<Utc>) -> bool {
        self.align_down(t) == t
    }

    /// Enumerates the starts of all segments whose start falls inside `window`.
    #[must_use]
    pub fn segments(&self, window: &SyncWindow) -> Vec<DateTime<Utc>> {
        let mut starts = Vec::new();
        let mut current = self.align_up(window.start());
        while window.contains(current) {
            starts.push(current);
            current += self.period;
        }
        starts
    }
}

impl Default for SegmentGrid {
    fn default() -> Self {
        Self {
            period: TimeDelta::hours(i64::from(DEFAULT_SEGMENT_HOURS)),
        }
    }
}
