//! Shared fixtures for unit tests

use crate::http::{HttpClient, HttpClientConfig, Sleeper};
use async_trait::async_trait;
use chrono::{Duration as DateDuration, NaiveDate};
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// Records requested sleeps instead of sleeping
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Client against a mock server that never really sleeps
pub(crate) fn test_client(server: &MockServer, max_retries: u32) -> (HttpClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .max_retries(max_retries)
        .jitter(Duration::ZERO)
        .build();
    let client = HttpClient::with_config(config)
        .unwrap()
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

/// Requests the server has seen
pub(crate) async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

/// Value of a query parameter of a recorded request
pub(crate) fn query_value(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Replies with the given templates in order, repeating the last one
pub(crate) struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub(crate) fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[i.min(self.responses.len() - 1)].clone()
    }
}

static CREATED_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"created:(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})").unwrap());

/// In-memory search endpoint
///
/// Holds a number of items per creation day and answers `q` containing a
/// `created:FROM..TO` qualifier the way the real endpoint does: envelope with
/// `total_count`, pages of `per_page`, 422 past page 10.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSearchIndex {
    days: BTreeMap<NaiveDate, u32>,
}

impl FakeSearchIndex {
    /// `per_day` items on each of `days` days from `start`
    pub(crate) fn uniform(start: NaiveDate, days: u32, per_day: u32) -> Self {
        let mut index = Self::default();
        for offset in 0..days {
            index = index.with_day(start + DateDuration::days(i64::from(offset)), per_day);
        }
        index
    }

    /// Set the item count of one day
    pub(crate) fn with_day(mut self, day: NaiveDate, count: u32) -> Self {
        self.days.insert(day, count);
        self
    }

    fn items(&self, from: NaiveDate, to: NaiveDate) -> Vec<serde_json::Value> {
        self.days
            .range(from..=to)
            .flat_map(|(day, count)| {
                let day = *day;
                (0..*count).map(move |i| {
                    json!({
                        "id": format!("{day}-{i}"),
                        "created_at": format!("{day}T12:00:00Z"),
                    })
                })
            })
            .collect()
    }
}

impl Respond for FakeSearchIndex {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = query_value(request, "q").unwrap_or_default();
        let Some(caps) = CREATED_RANGE.captures(&q) else {
            return ResponseTemplate::new(422).set_body_json(json!({"message": "Validation Failed"}));
        };
        let from = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").unwrap();
        let to = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").unwrap();

        let page: usize = query_value(request, "page").map_or(1, |p| p.parse().unwrap());
        let per_page: usize = query_value(request, "per_page").map_or(30, |p| p.parse().unwrap());
        if page > 10 {
            return ResponseTemplate::new(422).set_body_json(json!({
                "message": "Only the first 1000 search results are available"
            }));
        }

        let items = self.items(from, to);
        let start = ((page - 1) * per_page).min(items.len());
        let end = (page * per_page).min(items.len());
        let page_items = items[start..end].to_vec();

        ResponseTemplate::new(200).set_body_json(json!({
            "total_count": items.len(),
            "incomplete_results": false,
            "items": page_items,
        }))
    }
}
