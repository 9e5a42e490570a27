//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: YAML job → paginated and split requests →
//! JSON lines output and checkpoints

use async_trait::async_trait;
use chrono::{Duration as DateDuration, NaiveDate};
use regex::Regex;
use repo_harvest::http::{HttpClient, HttpClientConfig, Sleeper};
use repo_harvest::{load_job_from_str, Error, Harvester, JobRunner};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const NOW: i64 = 1_700_000_000;

// ============================================================================
// Fixtures
// ============================================================================

/// Fixed clock that records waits instead of sleeping
#[derive(Debug, Default)]
struct FrozenClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl FrozenClock {
    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for FrozenClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }

    fn now_epoch(&self) -> i64 {
        NOW
    }
}

fn client(server: &MockServer, max_retries: u32) -> (HttpClient, Arc<FrozenClock>) {
    let clock = Arc::new(FrozenClock::default());
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .max_retries(max_retries)
        .jitter(Duration::ZERO)
        .build();
    let client = HttpClient::with_config(config)
        .unwrap()
        .with_sleeper(clock.clone());
    (client, clock)
}

fn param(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Search endpoint over a per-day item count; odd items are pull requests
struct DayIndex {
    days: BTreeMap<NaiveDate, usize>,
    created: Regex,
}

impl DayIndex {
    fn new() -> Self {
        Self {
            days: BTreeMap::new(),
            created: Regex::new(r"created:(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})").unwrap(),
        }
    }

    fn days(mut self, start: NaiveDate, count: i64, per_day: usize) -> Self {
        for offset in 0..count {
            self.days.insert(start + DateDuration::days(offset), per_day);
        }
        self
    }
}

impl Respond for DayIndex {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = param(request, "q").unwrap_or_default();
        let Some(caps) = self.created.captures(&q) else {
            return ResponseTemplate::new(422);
        };
        let from = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").unwrap();
        let to = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").unwrap();
        let page: usize = param(request, "page").map_or(1, |p| p.parse().unwrap());
        let per_page: usize = param(request, "per_page").map_or(30, |p| p.parse().unwrap());
        if page > 10 {
            return ResponseTemplate::new(422)
                .set_body_json(json!({"message": "Only the first 1000 search results are available"}));
        }

        let items: Vec<Value> = self
            .days
            .range(from..=to)
            .flat_map(|(day, count)| {
                let day = *day;
                (0..*count).map(move |i| {
                    let mut item = json!({"id": format!("{day}-{i}"), "created_at": format!("{day}T08:00:00Z")});
                    if i % 2 == 1 {
                        item["pull_request"] = json!({"url": "x"});
                    }
                    item
                })
            })
            .collect();
        let start = ((page - 1) * per_page).min(items.len());
        let end = (page * per_page).min(items.len());

        ResponseTemplate::new(200).set_body_json(json!({
            "total_count": items.len(),
            "incomplete_results": false,
            "items": items[start..end].to_vec(),
        }))
    }
}

/// Commit list of two pages per slice, linked through the `Link` header
struct LinkedCommits {
    base: String,
}

impl Respond for LinkedCommits {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let since = param(request, "since").unwrap_or_default();
        let until = param(request, "until").unwrap_or_default();
        if param(request, "page").as_deref() == Some("2") {
            return ResponseTemplate::new(200).set_body_json(json!([{"sha": format!("{since}-3")}]));
        }
        let next = format!(
            "<{}/repos/acme/widgets/commits?page=2&since={since}&until={until}>; rel=\"next\"",
            self.base
        );
        ResponseTemplate::new(200)
            .insert_header("link", next.as_str())
            .set_body_json(json!([{"sha": format!("{since}-1")}, {"sha": format!("{since}-2")}]))
    }
}

fn job(dir: &Path, since: &str, until: &str, stages: &str) -> String {
    format!(
        r#"
owner: acme
repo: widgets
checkpoint:
  dir: "{ckpt}"
  namespace: it
window:
  since: "{since}"
  until: "{until}"
  slice_months: 1
output_dir: "{out}"
stages:
{stages}
"#,
        ckpt = dir.join("ckpt").display(),
        out = dir.join("out").display(),
    )
}

const STAGES: &str = r#"
  - name: commits
    kind: resource
    resource: "repos/{{ owner }}/{{ repo }}/commits"
  - name: pull_requests
    kind: search
    query: "repo:{{ owner }}/{{ repo }} is:pr created:{{ from }}..{{ to }}"
    item_kind: pull_request
"#;

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ============================================================================
// End-to-end jobs
// ============================================================================

#[tokio::test]
async fn test_job_collects_both_endpoint_families() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(LinkedCommits { base: server.uri() })
        .mount(&server)
        .await;
    // 20 heavy days in January force splits, February stays under the cap
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(DayIndex::new().days(d(2024, 1, 1), 20, 120).days(d(2024, 2, 1), 29, 10))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let config = load_job_from_str(&job(dir.path(), "2024-01-01", "2024-03-01", STAGES)).unwrap();
    let (client, _) = client(&server, 0);
    let runner = JobRunner::new(config, client).unwrap();

    let report = runner.run().await.unwrap();

    assert!(report.is_complete());
    assert!(report.overflows.is_empty());
    assert_eq!(report.checkpoints_cleared, 2);

    let commits = read_lines(&runner.output_path("commits"));
    let shas: Vec<&str> = commits.iter().filter_map(|c| c["sha"].as_str()).collect();
    assert_eq!(
        shas,
        vec![
            "2024-01-01T00:00:00Z-1",
            "2024-01-01T00:00:00Z-2",
            "2024-01-01T00:00:00Z-3",
            "2024-02-01T00:00:00Z-1",
            "2024-02-01T00:00:00Z-2",
            "2024-02-01T00:00:00Z-3",
        ]
    );

    let prs = read_lines(&runner.output_path("pull_requests"));
    let ids: HashSet<&str> = prs.iter().filter_map(|p| p["id"].as_str()).collect();
    assert_eq!(prs.len(), 20 * 60 + 29 * 5);
    assert_eq!(ids.len(), prs.len());
    assert!(prs.iter().all(|p| p.get("pull_request").is_some()));

    let created: Vec<&str> = prs.iter().filter_map(|p| p["created_at"].as_str()).collect();
    let mut sorted = created.clone();
    sorted.sort_unstable();
    assert_eq!(created, sorted);
}

#[tokio::test]
async fn test_single_day_overflow_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(DayIndex::new().days(d(2024, 1, 1), 1, 1500))
        .mount(&server)
        .await;

    let stages = r#"
  - name: busy_day
    kind: search
    query: "repo:{{ owner }}/{{ repo }} created:{{ from }}..{{ to }}"
"#;
    let dir = tempdir().unwrap();
    let config = load_job_from_str(&job(dir.path(), "2024-01-01", "2024-01-02", stages)).unwrap();
    let (client, _) = client(&server, 0);
    let runner = JobRunner::new(config, client).unwrap();

    let report = runner.run().await.unwrap();

    assert_eq!(report.stages[0].records, 1000);
    assert_eq!(report.overflows.len(), 1);
    let overflow = &report.overflows[0];
    assert_eq!(overflow.day, d(2024, 1, 1));
    assert_eq!(overflow.total_count, 1500);
    assert_eq!(overflow.retrievable, 1000);
    assert_eq!(overflow.missing(), 500);

    let pages: HashSet<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter_map(|r| param(r, "page"))
        .collect();
    assert!(!pages.contains("11"));
}

#[tokio::test]
async fn test_overflow_survives_resume() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(DayIndex::new().days(d(2024, 1, 1), 1, 1500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let stages = r#"
  - name: busy_day
    kind: search
    query: "repo:{{ owner }}/{{ repo }} created:{{ from }}..{{ to }}"
  - name: commits
    kind: resource
    resource: "repos/{{ owner }}/{{ repo }}/commits"
"#;
    let dir = tempdir().unwrap();
    let yaml = job(dir.path(), "2024-01-01", "2024-01-02", stages);
    let (first, _) = client(&server, 0);
    let runner = JobRunner::new(load_job_from_str(&yaml).unwrap(), first).unwrap();
    assert!(runner.run().await.is_err());
    assert_eq!(runner.harvester().overflows().len(), 1);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(LinkedCommits { base: server.uri() })
        .mount(&server)
        .await;

    let (second, _) = client(&server, 0);
    let runner = JobRunner::new(load_job_from_str(&yaml).unwrap(), second).unwrap();
    let report = runner.run().await.unwrap();

    assert!(report.is_complete());
    assert!(runner.harvester().overflows().is_empty());
    assert_eq!(report.stages[0].records, 1000);
    assert_eq!(report.overflows.len(), 1);
    assert_eq!(report.overflows[0].day, d(2024, 1, 1));
    assert_eq!(report.overflows[0].missing(), 500);
}

#[tokio::test]
async fn test_interrupted_job_resumes_from_checkpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(LinkedCommits { base: server.uri() })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let yaml = job(dir.path(), "2024-01-01", "2024-03-01", STAGES);
    let (first, _) = client(&server, 1);
    let runner = JobRunner::new(load_job_from_str(&yaml).unwrap(), first).unwrap();

    let err = runner.run().await.unwrap_err();
    assert!(matches!(err, Error::FetchFailure { status: Some(502), attempts: 2, .. }));
    assert!(dir.path().join("ckpt").join(".it_checkpoint_commits.json").exists());

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(DayIndex::new().days(d(2024, 1, 1), 60, 4))
        .mount(&server)
        .await;

    let (second, _) = client(&server, 0);
    let runner = JobRunner::new(load_job_from_str(&yaml).unwrap(), second).unwrap();
    let report = runner.run().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.stages[0].records, 6);
    assert_eq!(report.stages[1].records, 60 * 2);
    assert!(!dir.path().join("ckpt").join(".it_checkpoint_commits.json").exists());
}

// ============================================================================
// Transport behaviour through the public API
// ============================================================================

/// Replies with a rate-limit 403 first, then succeeds
struct LimitedOnce {
    calls: AtomicUsize,
}

impl Respond for LimitedOnce {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", (NOW + 10).to_string().as_str())
                .set_body_json(json!({"message": "API rate limit exceeded for user"}))
        } else {
            ResponseTemplate::new(200).set_body_json(json!({"number": 42}))
        }
    }
}

#[tokio::test]
async fn test_rate_limit_waits_for_reset_without_spending_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/42"))
        .respond_with(LimitedOnce {
            calls: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let (client, clock) = client(&server, 0);
    let pr = Harvester::new(client)
        .get_json("repos/acme/widgets/pulls/42")
        .await
        .unwrap();

    assert_eq!(pr["number"], 42);
    assert!(clock.sleeps().iter().any(|s| *s >= Duration::from_secs(10)));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_server_errors_exhaust_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (client, clock) = client(&server, 2);
    let err = Harvester::new(client)
        .get_json("repos/acme/widgets/pulls/1")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::FetchFailure { status: Some(503), attempts: 3, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    let backoffs = clock.sleeps();
    assert_eq!(backoffs.len(), 2);
    assert!(backoffs[1] >= backoffs[0]);
}
