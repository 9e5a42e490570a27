//! Pagination strategy implementations
//!
//! One paginator per endpoint family. Both expose a single-page fetch and a
//! lazy stream over every page.

use super::types::{next_link, FetchResult, Page, PageCursor, Progress, Query, SearchLimits};
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::types::{EndpointKind, JsonValue, RecordStream};
use futures::{stream, TryStreamExt};
use tracing::{debug, warn};

/// Turn a page-at-a-time fetch into a flat record stream
///
/// Pages are requested lazily; the items of a page are yielded before the
/// next page is requested.
fn page_stream<F, Fut, C>(first: C, label: String, fetch: F) -> RecordStream
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(Vec<JsonValue>, Option<C>)>> + Send + 'static,
    C: Send + 'static,
{
    let pages = stream::try_unfold(Some(first), move |cursor| {
        let next = cursor.map(&fetch);
        async move {
            let Some(next) = next else {
                return Ok::<_, Error>(None);
            };
            let (items, cursor) = next.await?;
            let items = stream::iter(items.into_iter().map(Ok::<JsonValue, Error>));
            Ok(Some((items, cursor)))
        }
    });

    let mut progress = Progress::new(label);
    Box::pin(pages.try_flatten().inspect_ok(move |_| progress.tick()))
}

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Link header pagination over resource list endpoints
///
/// Starts at `page=1` with `per_page` set, then follows the URL of the
/// `Link: <...>; rel="next"` header until a page is empty or carries no next
/// link.
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    client: HttpClient,
    per_page: u32,
}

impl CursorPaginator {
    /// Create a new cursor paginator
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            per_page: SearchLimits::default().page_size,
        }
    }

    /// Set the page size of the first request
    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Fetch a single page
    ///
    /// A `NextLink` cursor is requested as-is, since the link carries every
    /// parameter of the original query.
    pub async fn fetch_page(&self, query: &Query, cursor: &PageCursor) -> Result<FetchResult> {
        query.expect_kind(EndpointKind::ResourceList)?;

        let (url, config) = match cursor {
            PageCursor::Page(page) => (
                query.path.as_str(),
                query
                    .request_config()
                    .query("page", page.to_string())
                    .query("per_page", self.per_page.to_string()),
            ),
            PageCursor::NextLink(link) => (link.as_str(), RequestConfig::new()),
        };

        let response = self.client.get_json_response(url, config).await?;
        let items = Page::parse(EndpointKind::ResourceList, &response.url, response.body)?
            .into_items();
        debug!("Fetched {} records from {}", items.len(), response.url);

        if items.is_empty() {
            return Ok(FetchResult::last(items));
        }
        match next_link(&response.headers, "next") {
            Some(link) => Ok(FetchResult::more(items, PageCursor::NextLink(link))),
            None => Ok(FetchResult::last(items)),
        }
    }

    /// Stream every record of the query
    pub fn fetch_all(&self, query: &Query) -> RecordStream {
        let this = self.clone();
        let query = query.clone();
        let label = query.describe();

        page_stream(PageCursor::Page(1), label, move |cursor| {
            let this = this.clone();
            let query = query.clone();
            async move {
                let result = this.fetch_page(&query, &cursor).await?;
                let next = result.next_cursor();
                Ok::<_, Error>((result.items, next))
            }
        })
    }
}

// ============================================================================
// Capped Search Pagination
// ============================================================================

/// Page number pagination over the search endpoint
///
/// The server refuses pages past `max_pages`, so one query yields at most
/// `page_size * max_pages` records. A 422 marks the end of the retrievable
/// range and ends the stream without an error.
#[derive(Debug, Clone)]
pub struct CappedSearchPaginator {
    client: HttpClient,
    limits: SearchLimits,
}

impl CappedSearchPaginator {
    /// Create a new search paginator with the default limits
    pub fn new(client: HttpClient) -> Self {
        Self::with_limits(client, SearchLimits::default())
    }

    /// Create a new search paginator with custom limits
    pub fn with_limits(client: HttpClient, limits: SearchLimits) -> Self {
        Self { client, limits }
    }

    /// Page size and cap in use
    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    /// Fetch a single page
    pub async fn fetch_page(&self, query: &Query, page: u32) -> Result<FetchResult> {
        query.expect_kind(EndpointKind::Search)?;

        if page == 0 || page > self.limits.max_pages {
            return Ok(FetchResult::default());
        }

        let config = query
            .request_config()
            .query("page", page.to_string())
            .query("per_page", self.limits.page_size.to_string());

        let response = match self.client.get_json_response(&query.path, config).await {
            Ok(response) => response,
            Err(Error::RequestRejected { status: 422, .. }) => {
                debug!("Search for '{}' ends at page {page} (422)", query.describe());
                return Ok(FetchResult::default());
            }
            Err(e) => return Err(e),
        };

        let Page::SearchPage {
            incomplete_results,
            items,
            ..
        } = Page::parse(EndpointKind::Search, &response.url, response.body)?
        else {
            return Err(Error::unexpected_shape(response.url, "not a search page"));
        };

        if incomplete_results {
            warn!(
                "Search for '{}' returned incomplete results on page {page}",
                query.describe()
            );
        }
        debug!(
            "Fetched {} search results, page {page}/{}",
            items.len(),
            self.limits.max_pages
        );

        let full = items.len() >= self.limits.page_size as usize;
        if full && page < self.limits.max_pages {
            Ok(FetchResult::more(items, PageCursor::Page(page + 1)))
        } else {
            Ok(FetchResult::last(items))
        }
    }

    /// Stream every retrievable record of the query
    pub fn fetch_all(&self, query: &Query) -> RecordStream {
        let this = self.clone();
        let query = query.clone();
        let label = query.describe();

        page_stream(1u32, label, move |page| {
            let this = this.clone();
            let query = query.clone();
            async move {
                let result = this.fetch_page(&query, page).await?;
                let next = match result.next_cursor() {
                    Some(PageCursor::Page(n)) => Some(n),
                    _ => None,
                };
                Ok::<_, Error>((result.items, next))
            }
        })
    }

    /// Total number of matches, retrievable or not
    pub async fn count(&self, query: &Query) -> Result<u64> {
        query.expect_kind(EndpointKind::Search)?;

        let config = query
            .request_config()
            .query("page", "1")
            .query("per_page", "1");
        let response = self.client.get_json_response(&query.path, config).await?;

        match Page::parse(EndpointKind::Search, &response.url, response.body)? {
            Page::SearchPage {
                total_count,
                incomplete_results,
                ..
            } => {
                if incomplete_results {
                    warn!("Count for '{}' may be incomplete", query.describe());
                }
                Ok(total_count)
            }
            Page::ResourceList(_) => Err(Error::unexpected_shape(response.url, "not a search page")),
        }
    }
}
