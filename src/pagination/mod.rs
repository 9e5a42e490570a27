//! Pagination module
//!
//! Supports: Link header cursors, capped page-number search, date range
//! bisection
//!
//! # Overview
//!
//! Resource list endpoints return JSON arrays and point at the next page
//! through the `Link` header. The search endpoint wraps its items in an
//! envelope with a `total_count` and refuses to go past page 10, so any
//! query matching more than 1000 items has to be split by date. Every
//! paginator returns a lazy [`RecordStream`](crate::types::RecordStream).

mod splitter;
mod strategies;
mod types;

pub use splitter::{RangeSplitter, SearchTemplate};
pub use strategies::{CappedSearchPaginator, CursorPaginator};
pub use types::{
    next_link, parse_link_header, FetchResult, Overflow, Page, PageCursor, Query, SearchLimits,
    PROGRESS_INTERVAL, SEARCH_ISSUES_PATH,
};
