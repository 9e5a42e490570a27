//! Job configuration
//!
//! A harvest job is described in YAML: which repository, which time window,
//! and the stages to collect.
//!
//! ```yaml
//! owner: rust-lang
//! repo: cargo
//! window:
//!   since: "2023-01-01"
//!   until: "2024-01-01"
//!   slice_months: 3
//! stages:
//!   - name: commits
//!     kind: resource
//!     resource: "repos/{{ owner }}/{{ repo }}/commits"
//!   - name: pull_requests
//!     kind: search
//!     query: "repo:{{ owner }}/{{ repo }} is:pr created:{{ from }}..{{ to }}"
//!     item_kind: pull_request
//!   - name: reviews
//!     kind: each
//!     from: pull_requests
//!     resource: "repos/{{ owner }}/{{ repo }}/pulls/{{ number }}/reviews"
//!     parent_key: number
//! ```
//!
//! An `each` stage fetches once per record of an earlier stage. Top-level
//! scalar fields of the record, such as `number`, are template variables.

use crate::checkpoint::CheckpointStore;
use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiterConfig, DEFAULT_BASE_URL};
use crate::pagination::SearchTemplate;
use crate::template::TemplateContext;
use crate::types::{ItemKind, StringMap};
use crate::window::TimeWindow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Top-Level Job Config
// ============================================================================

/// Complete job configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Repository owner
    pub owner: String,

    /// Repository name
    pub repo: String,

    /// API endpoint and credentials
    #[serde(default)]
    pub api: ApiConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Checkpoint location
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Time window to collect
    pub window: WindowConfig,

    /// Directory receiving `<stage>.jsonl` files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Stages, run in order
    pub stages: Vec<StageConfig>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl JobConfig {
    /// Parse the time window
    pub fn time_window(&self) -> Result<TimeWindow> {
        TimeWindow::parse(&self.window.since, &self.window.until)
    }

    /// Variables available to stage templates
    pub fn template_context(&self) -> TemplateContext {
        TemplateContext::for_repo(&self.owner, &self.repo)
    }

    /// Checkpoint store of this job
    pub fn checkpoint_store(&self) -> Result<CheckpointStore> {
        CheckpointStore::new(&self.checkpoint.dir, &self.checkpoint.namespace)
    }

    /// HTTP client configuration, with the token if one is available
    pub fn client_config(&self, token: Option<String>) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .base_url(&self.api.base_url)
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .max_retries(self.http.max_retries)
            .backoff(
                Duration::from_secs(1),
                Duration::from_secs(self.http.max_backoff_secs),
            )
            .jitter(Duration::from_millis(self.http.jitter_ms))
            .request_delay(Duration::from_millis(self.http.request_delay_ms));

        if let Some(rps) = self.http.requests_per_second {
            builder = builder.rate_limit(RateLimiterConfig::new(rps, rps));
        }
        if let Some(token) = token {
            builder = builder.token(token);
        }
        builder.build()
    }

    /// Look up a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name == name)
    }
}

// ============================================================================
// Sections
// ============================================================================

/// API endpoint and credential source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for API requests
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries for 5xx and connection failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause after every successful request, in milliseconds
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Longest backoff between retries, in seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Upper bound of the random jitter added to backoffs, in milliseconds
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Optional client-side request rate
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            request_delay_ms: default_request_delay_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            jitter_ms: default_jitter_ms(),
            requests_per_second: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    6
}

fn default_request_delay_ms() -> u64 {
    300
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_jitter_ms() -> u64 {
    1500
}

/// Where checkpoints are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory of the checkpoint files
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,

    /// File name namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: default_checkpoint_dir(),
            namespace: default_namespace(),
        }
    }
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_namespace() -> String {
    crate::checkpoint::DEFAULT_NAMESPACE.to_string()
}

/// Calendar window of the job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// First day, inclusive
    pub since: String,

    /// Last day, exclusive
    pub until: String,

    /// Calendar months per slice
    #[serde(default = "default_slice_months")]
    pub slice_months: u32,
}

fn default_slice_months() -> u32 {
    1
}

// ============================================================================
// Stages
// ============================================================================

/// Endpoint family a stage reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Resource list walked with `since`/`until`
    Resource,
    /// Search query split by date
    Search,
    /// One fetch per record of an earlier stage
    Each,
}

/// One collection stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, also the checkpoint and output file name
    pub name: String,

    /// Endpoint family
    pub kind: StageKind,

    /// Resource path template, for resource stages
    #[serde(default)]
    pub resource: Option<String>,

    /// Search query template, for search stages
    #[serde(default)]
    pub query: Option<String>,

    /// Extra query parameters of resource stages
    #[serde(default)]
    pub params: StringMap,

    /// Filter applied to collected items
    #[serde(default)]
    pub item_kind: ItemKind,

    /// Whether a failing stage is skipped instead of failing the job
    #[serde(default)]
    pub optional: bool,

    /// Earlier stage whose records an `each` stage walks
    #[serde(default)]
    pub from: Option<String>,

    /// Whether an `each` path names a single object instead of a list
    #[serde(default)]
    pub single: bool,

    /// Parent field copied into each child object as `parent_<key>`
    #[serde(default)]
    pub parent_key: Option<String>,

    /// Items fetched between two checkpoints of an `each` stage
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_checkpoint_every() -> usize {
    50
}

impl StageConfig {
    /// Search template of a search stage
    pub fn search_template(&self) -> Result<SearchTemplate> {
        let query = self.query.as_deref().ok_or_else(|| {
            Error::invalid_value(
                format!("stages.{}.query", self.name),
                "search stages need a query",
            )
        })?;
        SearchTemplate::new(query)
    }

    /// Resource path template of a resource or `each` stage
    pub fn resource_path(&self) -> Result<&str> {
        self.resource.as_deref().ok_or_else(|| {
            Error::invalid_value(
                format!("stages.{}.resource", self.name),
                "resource and each stages need a resource path",
            )
        })
    }

    /// Source stage of an `each` stage
    pub fn source_stage(&self) -> Result<&str> {
        self.from.as_deref().ok_or_else(|| {
            Error::invalid_value(
                format!("stages.{}.from", self.name),
                "each stages need a source stage",
            )
        })
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load a job configuration from a YAML file
pub fn load_job(path: impl AsRef<Path>) -> Result<JobConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read job file '{}': {e}", path.display()))
    })?;
    load_job_from_str(&content)
}

/// Load a job configuration from a YAML string
pub fn load_job_from_str(yaml: &str) -> Result<JobConfig> {
    let job: JobConfig = serde_yaml::from_str(yaml)?;
    validate_job(&job)?;
    Ok(job)
}

/// Validate a job configuration
fn validate_job(job: &JobConfig) -> Result<()> {
    if job.owner.is_empty() || job.repo.is_empty() {
        return Err(Error::config("Job owner and repo cannot be empty"));
    }

    if job.stages.is_empty() {
        return Err(Error::config("Job must have at least one stage"));
    }

    if job.window.slice_months == 0 {
        return Err(Error::invalid_value("window.slice_months", "must be at least 1"));
    }
    job.time_window()?;

    let store = job.checkpoint_store()?;
    let mut names = HashSet::new();
    for stage in &job.stages {
        store.path_for(&stage.name)?;
        if !names.insert(stage.name.as_str()) {
            return Err(Error::config(format!("Duplicate stage name '{}'", stage.name)));
        }
        match stage.kind {
            StageKind::Resource => {
                stage.resource_path()?;
            }
            StageKind::Search => {
                stage.search_template()?;
            }
            StageKind::Each => {
                stage.resource_path()?;
                let from = stage.source_stage()?;
                if from == stage.name || !names.contains(from) {
                    return Err(Error::invalid_value(
                        format!("stages.{}.from", stage.name),
                        format!("'{from}' is not an earlier stage"),
                    ));
                }
                if stage.checkpoint_every == 0 {
                    return Err(Error::invalid_value(
                        format!("stages.{}.checkpoint_every", stage.name),
                        "must be at least 1",
                    ));
                }
            }
        }
    }

    Ok(())
}
