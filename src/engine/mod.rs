//! Execution engine module
//!
//! Walks a time window slice by slice over either endpoint family.
//!
//! # Overview
//!
//! The engine module provides:
//! - `Harvester` - Owns the paginators of a job and turns windows into record streams
//! - `WindowCollector` - Slice-level resumable collection through the checkpoint store
//! - `collect_each` - Per-record fan-out, checkpointed every few records
//! - `JobRunner` - Runs the stages of a YAML job and writes their output

mod job;
mod types;

pub use job::JobRunner;
pub use types::{JobReport, Source, StageReport, StageStatus};

use crate::checkpoint::{CheckpointStore, ItemProgress, WindowProgress};
use crate::error::Result;
use crate::http::HttpClient;
use crate::pagination::{
    CappedSearchPaginator, CursorPaginator, Overflow, Query, RangeSplitter, SearchLimits,
    SearchTemplate,
};
use crate::types::{JsonValue, RecordStream};
use crate::window::{fingerprint, TimeSlice, TimeWindow};
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

/// Paginators of one job, sharing a single HTTP client
#[derive(Debug, Clone)]
pub struct Harvester {
    client: HttpClient,
    cursor: CursorPaginator,
    search: CappedSearchPaginator,
    splitter: RangeSplitter,
}

impl Harvester {
    /// Create a harvester with the default search limits
    pub fn new(client: HttpClient) -> Self {
        Self::with_limits(client, SearchLimits::default())
    }

    /// Create a harvester with custom search limits
    pub fn with_limits(client: HttpClient, limits: SearchLimits) -> Self {
        let cursor = CursorPaginator::new(client.clone()).with_per_page(limits.page_size);
        let search = CappedSearchPaginator::with_limits(client.clone(), limits);
        let splitter = RangeSplitter::new(search.clone());
        Self {
            client,
            cursor,
            search,
            splitter,
        }
    }

    /// The underlying HTTP client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Single-day search overflows recorded so far
    pub fn overflows(&self) -> Vec<Overflow> {
        self.splitter.overflows()
    }

    /// Fetch a single resource, such as a pull request's details
    pub async fn get_json(&self, path: &str) -> Result<JsonValue> {
        self.client.get_json(path).await
    }

    /// Total matches of a search query
    pub async fn count(&self, q: &str) -> Result<u64> {
        self.search.count(&Query::search(q)).await
    }

    /// Records under a rendered path: the list it pages through, or the
    /// single object when `single` is set
    pub fn fetch_path(&self, path: impl Into<String>, single: bool) -> RecordStream {
        let path = path.into();
        if single {
            let client = self.client.clone();
            stream::once(async move { client.get_json(&path).await }).boxed()
        } else {
            self.cursor.fetch_all(&Query::resource(path))
        }
    }

    /// Records of one slice
    pub fn fetch_slice(&self, source: &Source, slice: &TimeSlice) -> RecordStream {
        match source {
            Source::Resource(query) => {
                let query = query
                    .clone()
                    .with_param("since", slice.since_param())
                    .with_param("until", slice.until_param());
                self.cursor.fetch_all(&query)
            }
            Source::Search(template) => match slice.date_range() {
                Some(range) => self.splitter.fetch_range(template, range.from, range.to),
                None => stream::empty().boxed(),
            },
        }
    }

    /// Records of every slice of a window, slice after slice
    pub fn fetch_window(&self, source: &Source, window: &TimeWindow, months: u32) -> RecordStream {
        let slices = match window.slices(months) {
            Ok(slices) => slices,
            Err(e) => return stream::iter([Err(e)]).boxed(),
        };
        let this = self.clone();
        let source = source.clone();

        stream::iter(slices)
            .map(move |slice| {
                debug!("Fetching slice {}", slice.id());
                this.fetch_slice(&source, &slice)
            })
            .flatten()
            .boxed()
    }

    /// Records of a repository resource list such as `commits`
    pub fn fetch_resource_window(
        &self,
        owner: &str,
        repo: &str,
        resource: &str,
        window: &TimeWindow,
        months: u32,
    ) -> RecordStream {
        let query = Query::resource(format!(
            "repos/{owner}/{repo}/{}",
            resource.trim_start_matches('/')
        ));
        self.fetch_window(&Source::Resource(query), window, months)
    }

    /// Matches of a search template over a window
    pub fn fetch_search_window(
        &self,
        template: &SearchTemplate,
        window: &TimeWindow,
        months: u32,
    ) -> RecordStream {
        self.fetch_window(&Source::Search(template.clone()), window, months)
    }
}

/// Collect the records of every slice, checkpointing after each one
///
/// Shorthand for an unscoped [`WindowCollector`].
pub async fn collect_window<F>(
    store: &CheckpointStore,
    stage: &str,
    slices: &[TimeSlice],
    fetch: F,
) -> Result<Vec<JsonValue>>
where
    F: Fn(&TimeSlice) -> RecordStream,
{
    let progress = WindowCollector::new(store, stage).collect(slices, fetch).await?;
    Ok(progress.records)
}

/// Slice-level resumable collection of one stage
///
/// Progress is saved as a [`WindowProgress`] under the stage name after
/// every slice. A rerun resumes at the first slice not yet collected.
/// Progress recorded for a different scope or slicing is discarded, and a
/// slice that fails is collected again from its start on the next run.
#[derive(Debug, Clone)]
pub struct WindowCollector<'a> {
    store: &'a CheckpointStore,
    stage: &'a str,
    scope: String,
    harvester: Option<&'a Harvester>,
}

impl<'a> WindowCollector<'a> {
    /// Collector of `stage` in `store`
    pub fn new(store: &'a CheckpointStore, stage: &'a str) -> Self {
        Self {
            store,
            stage,
            scope: String::new(),
            harvester: None,
        }
    }

    /// Describe what the stage fetches; progress of another scope is dropped
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Keep the search overflows each slice adds to the harvester's log
    #[must_use]
    pub fn tracking_overflows(mut self, harvester: &'a Harvester) -> Self {
        self.harvester = Some(harvester);
        self
    }

    /// Collect every slice not yet in the checkpoint
    pub async fn collect<F>(&self, slices: &[TimeSlice], fetch: F) -> Result<WindowProgress>
    where
        F: Fn(&TimeSlice) -> RecordStream,
    {
        let stage = self.stage;
        let window = fingerprint(slices);
        let fresh = || WindowProgress::new(&window).with_scope(&self.scope);
        let mut progress = self.store.load(stage, fresh()).await?;

        if !progress.matches(&self.scope, &window) {
            warn!("Checkpoint of '{stage}' belongs to another source or slicing, starting over");
            debug!(
                "Stored scope '{}' window {}, current scope '{}' window {window}",
                progress.scope, progress.window, self.scope
            );
            progress = fresh();
        }
        if progress.completed {
            info!(
                "Stage '{stage}' already collected ({} records)",
                progress.records.len()
            );
            return Ok(progress);
        }
        if progress.next_slice > 0 {
            info!(
                "Resuming '{stage}' at slice {}/{} with {} records",
                progress.next_slice + 1,
                slices.len(),
                progress.records.len()
            );
        }

        for slice in slices.iter().skip(progress.next_slice) {
            let seen = self.overflow_count();
            let records: Vec<JsonValue> = fetch(slice).try_collect().await?;
            debug!("Slice {} of '{stage}': {} records", slice.id(), records.len());
            progress.push_slice(records);
            progress.overflows.extend(self.overflows_since(seen));
            progress.completed = progress.next_slice >= slices.len();
            self.store.save(stage, &progress).await?;
        }

        if !progress.completed {
            progress.completed = true;
            self.store.save(stage, &progress).await?;
        }

        Ok(progress)
    }

    fn overflow_count(&self) -> usize {
        self.harvester.map_or(0, |h| h.overflows().len())
    }

    fn overflows_since(&self, seen: usize) -> Vec<Overflow> {
        self.harvester
            .map(|h| h.overflows().into_iter().skip(seen).collect())
            .unwrap_or_default()
    }
}

/// Collect the records `fetch` yields for every item, in item order
///
/// Progress is saved as an [`ItemProgress`] under `stage` every `every`
/// items and once at the end. A rerun resumes after the last saved item;
/// progress recorded for a different `scope` is discarded.
pub async fn collect_each<F>(
    store: &CheckpointStore,
    stage: &str,
    scope: &str,
    items: &[JsonValue],
    every: usize,
    fetch: F,
) -> Result<Vec<JsonValue>>
where
    F: Fn(&JsonValue) -> RecordStream,
{
    let every = every.max(1);
    let mut progress = store.load(stage, ItemProgress::new(scope)).await?;

    if progress.scope != scope {
        warn!("Checkpoint of '{stage}' belongs to another item list, starting over");
        progress = ItemProgress::new(scope);
    }
    if progress.completed {
        info!(
            "Stage '{stage}' already collected ({} records)",
            progress.records.len()
        );
        return Ok(progress.records);
    }
    if progress.next_item > 0 {
        info!(
            "Resuming '{stage}' at item {}/{} with {} records",
            progress.next_item + 1,
            items.len(),
            progress.records.len()
        );
    }

    for item in items.iter().skip(progress.next_item) {
        let records: Vec<JsonValue> = fetch(item).try_collect().await?;
        progress.push_item(records);
        if progress.next_item % every == 0 && progress.next_item < items.len() {
            debug!("'{stage}': {}/{} items", progress.next_item, items.len());
            store.save(stage, &progress).await?;
        }
    }

    progress.completed = true;
    store.save(stage, &progress).await?;
    Ok(progress.records)
}
