//! Calendar-month slicing of a time window

use super::types::{TimeSlice, TimeWindow};
use crate::error::{Error, Result};
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, Utc};

/// Split `[start, end)` into consecutive slices of `months` calendar months
///
/// Boundaries are `start + k * months`, so a window starting on Jan 31 has
/// boundaries clamped to month ends (Feb 29, Mar 31, ...). The last slice is
/// truncated at `end`. An empty window yields no slices.
pub fn month_slices(start: NaiveDate, end: NaiveDate, months: u32) -> Result<Vec<TimeSlice>> {
    if months == 0 {
        return Err(Error::invalid_value("slice_months", "must be at least 1"));
    }

    let mut slices = Vec::new();
    let mut current = start;
    let mut step: u32 = 0;

    while current < end {
        step += 1;
        let boundary = step
            .checked_mul(months)
            .and_then(|total| start.checked_add_months(Months::new(total)))
            .ok_or_else(|| {
                Error::invalid_value("window", format!("slice boundary overflows after {current}"))
            })?;
        let slice_end = boundary.min(end);
        slices.push(TimeSlice::from_dates(current, slice_end));
        current = slice_end;
    }

    Ok(slices)
}

/// Stable description of a slicing, used to detect a changed window on resume
///
/// Every slice boundary is listed, so slicings of the same window with the
/// same number of slices still differ.
pub fn fingerprint(slices: &[TimeSlice]) -> String {
    let Some(first) = slices.first() else {
        return "empty".to_string();
    };
    std::iter::once(first.since_param())
        .chain(slices.iter().map(TimeSlice::until_param))
        .collect::<Vec<_>>()
        .join(",")
}

impl TimeWindow {
    /// Parse a window from two date strings
    pub fn parse(since: &str, until: &str) -> Result<Self> {
        Ok(Self::new(parse_date(since)?, parse_date(until)?))
    }

    /// Slice the window into chunks of `months` calendar months
    pub fn slices(&self, months: u32) -> Result<Vec<TimeSlice>> {
        month_slices(self.start, self.end, months)
    }
}

/// Parse a calendar date
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD` and full timestamps, of which only the
/// UTC date is kept.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ndt.date());
        }
    }

    Err(Error::config(format!("Invalid date format: {s}")))
}
