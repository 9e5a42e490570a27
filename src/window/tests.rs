//! Tests for window module

use super::*;
use chrono::{NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use test_case::test_case;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// month_slices
// ============================================================================

#[test]
fn test_quarterly_slices_of_a_year() {
    let slices = month_slices(date(2023, 1, 1), date(2024, 1, 1), 3).unwrap();

    let bounds: Vec<(NaiveDate, NaiveDate)> = slices
        .iter()
        .map(|s| (s.start.date_naive(), s.end.date_naive()))
        .collect();
    assert_eq!(
        bounds,
        vec![
            (date(2023, 1, 1), date(2023, 4, 1)),
            (date(2023, 4, 1), date(2023, 7, 1)),
            (date(2023, 7, 1), date(2023, 10, 1)),
            (date(2023, 10, 1), date(2024, 1, 1)),
        ]
    );
}

#[test]
fn test_last_slice_is_truncated() {
    let slices = month_slices(date(2024, 1, 15), date(2024, 3, 1), 1).unwrap();

    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0].end.date_naive(), date(2024, 2, 15));
    assert_eq!(slices[1].start.date_naive(), date(2024, 2, 15));
    assert_eq!(slices[1].end.date_naive(), date(2024, 3, 1));
}

#[test]
fn test_boundaries_measured_from_window_start() {
    // Jan 31 + 1 month clamps to Feb 29, + 2 months lands on Mar 31
    let slices = month_slices(date(2024, 1, 31), date(2024, 4, 30), 1).unwrap();
    let ends: Vec<NaiveDate> = slices.iter().map(|s| s.end.date_naive()).collect();

    assert_eq!(ends, vec![date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]);
}

#[test]
fn test_empty_window_has_no_slices() {
    assert!(month_slices(date(2024, 1, 1), date(2024, 1, 1), 1).unwrap().is_empty());
    assert!(month_slices(date(2024, 2, 1), date(2024, 1, 1), 1).unwrap().is_empty());
}

#[test]
fn test_zero_months_is_rejected() {
    let err = month_slices(date(2024, 1, 1), date(2024, 2, 1), 0).unwrap_err();
    assert!(matches!(err, crate::Error::InvalidConfigValue { .. }));
}

#[test_case(date(2020, 1, 1), date(2024, 6, 17), 1 ; "monthly over years")]
#[test_case(date(2020, 3, 31), date(2021, 3, 1), 2 ; "bimonthly from month end")]
#[test_case(date(2022, 5, 5), date(2022, 5, 6), 6 ; "single day")]
#[test_case(date(2019, 11, 30), date(2025, 1, 1), 12 ; "yearly")]
fn test_slices_tile_the_window(start: NaiveDate, end: NaiveDate, months: u32) {
    let slices = month_slices(start, end, months).unwrap();

    assert_eq!(slices.first().unwrap().start, start_of_day(start));
    assert_eq!(slices.last().unwrap().end, start_of_day(end));
    for slice in &slices {
        assert!(slice.start < slice.end);
    }
    for pair in slices.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
}

#[test]
fn test_time_window_slices() {
    let window = TimeWindow::parse("2024-01-01", "2024-07-01").unwrap();
    assert_eq!(window.slices(2).unwrap().len(), 3);
    assert!(!window.is_empty());
}

#[test]
fn test_fingerprint_changes_with_slicing() {
    let window = TimeWindow::parse("2024-01-01", "2024-07-01").unwrap();
    let monthly = fingerprint(&window.slices(1).unwrap());
    let bimonthly = fingerprint(&window.slices(2).unwrap());

    assert!(monthly.starts_with("2024-01-01T00:00:00Z,2024-02-01T00:00:00Z,"));
    assert!(monthly.ends_with(",2024-07-01T00:00:00Z"));
    assert_eq!(monthly.split(',').count(), 7);
    assert_ne!(monthly, bimonthly);
    assert_eq!(fingerprint(&[]), "empty");
}

#[test]
fn test_fingerprint_tells_apart_slicings_with_same_endpoints_and_count() {
    let window = TimeWindow::parse("2024-01-01", "2025-01-01").unwrap();
    let five = window.slices(5).unwrap();
    let four = window.slices(4).unwrap();

    assert_eq!(five.len(), four.len());
    assert_eq!(five[0].since_param(), four[0].since_param());
    assert_eq!(five[2].until_param(), four[2].until_param());
    assert_ne!(fingerprint(&five), fingerprint(&four));
}

// ============================================================================
// TimeSlice
// ============================================================================

#[test]
fn test_slice_params() {
    let slice = TimeSlice::from_dates(date(2024, 1, 1), date(2024, 2, 1));

    assert_eq!(slice.since_param(), "2024-01-01T00:00:00Z");
    assert_eq!(slice.until_param(), "2024-02-01T00:00:00Z");
    assert_eq!(slice.id(), "2024-01-01T00:00:00Z..2024-02-01T00:00:00Z");
}

#[test]
fn test_slice_contains_is_half_open() {
    let slice = TimeSlice::from_dates(date(2024, 1, 1), date(2024, 2, 1));

    assert!(slice.contains(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    assert!(slice.contains(Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()));
    assert!(!slice.contains(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
}

#[test]
fn test_slice_date_range_is_inclusive() {
    let slice = TimeSlice::from_dates(date(2024, 1, 1), date(2024, 2, 1));
    let range = slice.date_range().unwrap();

    assert_eq!(range, DateRange::new(date(2024, 1, 1), date(2024, 1, 31)));
    assert_eq!(range.to_string(), "2024-01-01..2024-01-31");
}

#[test]
fn test_adjacent_slices_give_disjoint_date_ranges() {
    let slices = month_slices(date(2024, 1, 1), date(2024, 4, 1), 1).unwrap();
    let ranges: Vec<DateRange> = slices.iter().filter_map(TimeSlice::date_range).collect();

    for pair in ranges.windows(2) {
        assert!(pair[0].to < pair[1].from);
        assert_eq!(pair[0].to.succ_opt().unwrap(), pair[1].from);
    }
}

// ============================================================================
// DateRange
// ============================================================================

#[test]
fn test_split_two_day_range() {
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2));
    let (left, right) = range.split().unwrap();

    assert_eq!(left, DateRange::new(date(2024, 1, 1), date(2024, 1, 1)));
    assert_eq!(right, DateRange::new(date(2024, 1, 2), date(2024, 1, 2)));
}

#[test]
fn test_split_covers_every_day_once() {
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 25));
    let (left, right) = range.split().unwrap();

    assert_eq!(left, DateRange::new(date(2024, 1, 1), date(2024, 1, 13)));
    assert_eq!(right, DateRange::new(date(2024, 1, 14), date(2024, 1, 25)));
    assert_eq!(left.days() + right.days(), range.days());
}

#[test]
fn test_single_day_cannot_split() {
    let range = DateRange::new(date(2024, 1, 5), date(2024, 1, 5));
    assert!(range.is_single_day());
    assert_eq!(range.days(), 1);
    assert!(range.split().is_none());
}

// ============================================================================
// parse_date
// ============================================================================

#[test_case("2024-03-05" ; "iso date")]
#[test_case("2024/03/05" ; "slashes")]
#[test_case("2024-03-05T10:11:12Z" ; "rfc3339")]
#[test_case("2024-03-05T10:11:12" ; "naive timestamp")]
#[test_case(" 2024-03-05 " ; "surrounding whitespace")]
fn test_parse_date_formats(input: &str) {
    assert_eq!(parse_date(input).unwrap(), date(2024, 3, 5));
}

#[test]
fn test_parse_date_rejects_garbage() {
    assert!(parse_date("last tuesday").is_err());
}
