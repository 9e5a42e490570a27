//! Window types
//!
//! Half-open timestamp slices for resource endpoints, inclusive day ranges
//! for search qualifiers.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Format used for `since`/`until` query parameters
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format used for search date qualifiers
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Midnight UTC at the start of a calendar day
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// The overall interval a job covers: `[start, end)` in calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// First day, inclusive
    pub start: NaiveDate,
    /// Last day, exclusive
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Create a new window
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Check if the window contains no days
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

}

/// Half-open interval `[start, end)` of UTC timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlice {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl TimeSlice {
    /// Create a new slice
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Create a slice spanning whole days, `[start, end)`
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(start_of_day(start), start_of_day(end))
    }

    /// Identifier for logs and checkpoints
    pub fn id(&self) -> String {
        format!(
            "{}..{}",
            self.start.format(TIMESTAMP_FORMAT),
            self.end.format(TIMESTAMP_FORMAT)
        )
    }

    /// Value for the `since` parameter
    pub fn since_param(&self) -> String {
        self.start.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Value for the `until` parameter
    pub fn until_param(&self) -> String {
        self.end.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Check if a timestamp falls inside the slice
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// The calendar days the slice covers, as an inclusive range
    ///
    /// Returns `None` for a slice shorter than a day's boundary crossing.
    pub fn date_range(&self) -> Option<DateRange> {
        let from = self.start.date_naive();
        let to = (self.end - Duration::seconds(1)).date_naive();
        (from <= to).then_some(DateRange::new(from, to))
    }
}

/// Inclusive range of calendar days `[from, to]`
///
/// Search qualifiers like `created:2024-01-01..2024-01-31` include both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day, inclusive
    pub from: NaiveDate,
    /// Last day, inclusive
    pub to: NaiveDate,
}

impl DateRange {
    /// Create a new range
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Number of days in the range
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// Check if the range is a single day and so cannot be bisected
    pub fn is_single_day(&self) -> bool {
        self.from >= self.to
    }

    /// Bisect into `[from, mid]` and `[mid + 1, to]`
    ///
    /// Every day lands in exactly one half. `None` for a single day.
    pub fn split(&self) -> Option<(DateRange, DateRange)> {
        if self.is_single_day() {
            return None;
        }
        let mid = self.from + Duration::days((self.to - self.from).num_days() / 2);
        Some((
            DateRange::new(self.from, mid),
            DateRange::new(mid + Duration::days(1), self.to),
        ))
    }

    /// `from` formatted for a search qualifier
    pub fn from_date(&self) -> String {
        self.from.format(DATE_FORMAT).to_string()
    }

    /// `to` formatted for a search qualifier
    pub fn to_date(&self) -> String {
        self.to.format(DATE_FORMAT).to_string()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from_date(), self.to_date())
    }
}
