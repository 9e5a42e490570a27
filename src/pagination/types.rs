//! Pagination types
//!
//! Queries, cursors and the two response shapes, validated right after
//! deserialization.

use crate::error::{Error, Result};
use crate::http::RequestConfig;
use crate::types::{EndpointKind, JsonValue, StringMap};
use chrono::NaiveDate;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Path of the issue and pull request search endpoint
pub const SEARCH_ISSUES_PATH: &str = "search/issues";

/// Records between progress log lines
pub const PROGRESS_INTERVAL: u64 = 500;

/// Page size and page cap of the search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Items per page, also the page size used for resource lists
    pub page_size: u32,
    /// Highest reachable page number
    pub max_pages: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 10,
        }
    }
}

impl SearchLimits {
    /// Most results a single search query can return
    pub fn cap(&self) -> u64 {
        u64::from(self.page_size) * u64::from(self.max_pages)
    }
}

// ============================================================================
// Query
// ============================================================================

/// An immutable request description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Endpoint family
    pub kind: EndpointKind,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    /// Extra query parameters
    pub params: StringMap,
    /// Free-text search predicate, sent as `q`
    pub search: Option<String>,
}

impl Query {
    /// Query against a resource list endpoint
    pub fn resource(path: impl Into<String>) -> Self {
        Self {
            kind: EndpointKind::ResourceList,
            path: path.into(),
            params: StringMap::new(),
            search: None,
        }
    }

    /// Query against the issue search endpoint
    pub fn search(q: impl Into<String>) -> Self {
        Self {
            kind: EndpointKind::Search,
            path: SEARCH_ISSUES_PATH.to_string(),
            params: StringMap::new(),
            search: Some(q.into()),
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Use a different path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Fail unless the query targets the given endpoint family
    pub(crate) fn expect_kind(&self, kind: EndpointKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::config(format!(
                "{} query for '{}' used with a {kind} paginator",
                self.kind, self.path
            )))
        }
    }

    /// Base request config carrying the parameters and search predicate
    pub(crate) fn request_config(&self) -> RequestConfig {
        let config = RequestConfig::new().query_map(&self.params);
        match &self.search {
            Some(q) => config.query("q", q.as_str()),
            None => config,
        }
    }

    /// Short description for logs and diagnostics
    pub fn describe(&self) -> String {
        match &self.search {
            Some(q) => q.clone(),
            None => self.path.clone(),
        }
    }
}

// ============================================================================
// Cursor and fetch result
// ============================================================================

/// Position of the next page to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageCursor {
    /// Absolute URL from a `Link: rel="next"` header
    NextLink(String),
    /// One-based page number
    Page(u32),
}

/// Items of one page plus how to get the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    /// Records in server order
    pub items: Vec<JsonValue>,
    /// Whether another page should be requested
    pub has_more: bool,
    /// Cursor of the next page, set when `has_more`
    pub cursor_for_next: Option<PageCursor>,
}

impl FetchResult {
    /// A final page
    pub fn last(items: Vec<JsonValue>) -> Self {
        Self {
            items,
            has_more: false,
            cursor_for_next: None,
        }
    }

    /// A page followed by another
    pub fn more(items: Vec<JsonValue>, next: PageCursor) -> Self {
        Self {
            items,
            has_more: true,
            cursor_for_next: Some(next),
        }
    }

    /// Cursor to continue with, if any
    pub fn next_cursor(&self) -> Option<PageCursor> {
        if self.has_more {
            self.cursor_for_next.clone()
        } else {
            None
        }
    }
}

// ============================================================================
// Response shapes
// ============================================================================

/// Validated response body
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    /// JSON array of a resource list endpoint
    ResourceList(Vec<JsonValue>),
    /// Envelope of the search endpoint
    SearchPage {
        /// Matches across all pages, may exceed what can be retrieved
        total_count: u64,
        /// Set when the server timed out before finding every match
        incomplete_results: bool,
        /// Items of this page
        items: Vec<JsonValue>,
    },
}

#[derive(Deserialize)]
struct SearchEnvelope {
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    items: Vec<JsonValue>,
}

impl Page {
    /// Validate a body against the shape its endpoint family must return
    pub fn parse(kind: EndpointKind, url: &str, body: JsonValue) -> Result<Self> {
        match kind {
            EndpointKind::ResourceList => match body {
                JsonValue::Array(items) => Ok(Self::ResourceList(items)),
                other => Err(Error::unexpected_shape(
                    url,
                    format!("expected a JSON array, got {}", json_type(&other)),
                )),
            },
            EndpointKind::Search => {
                let envelope: SearchEnvelope = serde_json::from_value(body).map_err(|e| {
                    Error::unexpected_shape(url, format!("invalid search envelope: {e}"))
                })?;
                Ok(Self::SearchPage {
                    total_count: envelope.total_count,
                    incomplete_results: envelope.incomplete_results,
                    items: envelope.items,
                })
            }
        }
    }

    /// Number of items on the page
    pub fn len(&self) -> usize {
        match self {
            Self::ResourceList(items) | Self::SearchPage { items, .. } => items.len(),
        }
    }

    /// Check if the page has no items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the items
    pub fn into_items(self) -> Vec<JsonValue> {
        match self {
            Self::ResourceList(items) | Self::SearchPage { items, .. } => items,
        }
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

// ============================================================================
// Link header
// ============================================================================

/// Extract the URL for `rel` from the `Link` headers of a response
pub fn next_link(headers: &HeaderMap, rel: &str) -> Option<String> {
    headers
        .get_all("link")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|value| parse_link_header(value, rel))
}

/// Parse a Link header and extract the URL for the given rel
///
/// Format: `<https://api.github.com/...?page=2>; rel="next", <...>; rel="last"`
pub fn parse_link_header(header: &str, target_rel: &str) -> Option<String> {
    for part in header.split(',') {
        let mut url = None;
        let mut rels = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                url = Some(inner);
            } else if let Some(value) = segment.strip_prefix("rel=") {
                rels = Some(value.trim_matches('"').trim_matches('\''));
            }
        }

        // rel may list several space-separated relation types
        if let (Some(u), Some(r)) = (url, rels) {
            if r.split_whitespace().any(|r| r == target_rel) {
                return Some(u.to_string());
            }
        }
    }

    None
}

// ============================================================================
// Overflow diagnostics
// ============================================================================

/// A single-day search range whose matches exceed what search can return
///
/// The excess cannot be retrieved by date splitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overflow {
    /// Rendered search query
    pub query: String,
    /// The unsplittable day
    pub day: NaiveDate,
    /// Matches the server reported
    pub total_count: u64,
    /// Matches that could be retrieved
    pub retrievable: u64,
}

impl Overflow {
    /// Matches lost to the cap
    pub fn missing(&self) -> u64 {
        self.total_count.saturating_sub(self.retrievable)
    }
}

impl std::fmt::Display for Overflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} of {} matches retrievable for '{}'",
            self.day, self.retrievable, self.total_count, self.query
        )
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Counts streamed records and logs every [`PROGRESS_INTERVAL`]
#[derive(Debug, Clone)]
pub(crate) struct Progress {
    label: String,
    count: u64,
}

impl Progress {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: 0,
        }
    }

    pub(crate) fn tick(&mut self) {
        self.count += 1;
        if self.count % PROGRESS_INTERVAL == 0 {
            debug!("{}: {} records so far", self.label, self.count);
        }
    }
}
