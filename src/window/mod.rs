//! Time window slicing
//!
//! Resource endpoints are walked one slice at a time with `since`/`until`
//! parameters; search endpoints turn the same slices into inclusive date
//! qualifiers.

mod slicer;
mod types;

pub use slicer::{fingerprint, month_slices, parse_date};
pub use types::{start_of_day, DateRange, TimeSlice, TimeWindow, DATE_FORMAT, TIMESTAMP_FORMAT};

#[cfg(test)]
mod tests;
