//! Engine types
//!
//! Record sources and the reports of a job run.

use crate::pagination::{Overflow, Query, SearchTemplate};
use serde::Serialize;
use std::path::PathBuf;

/// Where the records of a slice come from
#[derive(Debug, Clone)]
pub enum Source {
    /// Resource list, walked with `since`/`until` per slice
    Resource(Query),
    /// Search template, bisected per slice
    Search(SearchTemplate),
}

impl Source {
    /// What the source fetches, with its parameters in key order
    pub fn describe(&self) -> String {
        match self {
            Source::Resource(query) if query.params.is_empty() => query.path.clone(),
            Source::Resource(query) => {
                let params: Vec<String> = query
                    .params
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect();
                format!("{}?{}", query.path, params.join("&"))
            }
            Source::Search(template) => format!("search {}", template.as_str()),
        }
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    /// Every slice was collected
    Completed,
    /// An optional stage failed and was skipped
    Skipped {
        /// The error that ended the stage
        reason: String,
    },
}

/// Report of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// Stage name
    pub name: String,
    /// Records written
    pub records: usize,
    /// Outcome
    #[serde(flatten)]
    pub status: StageStatus,
    /// Output file, for completed stages
    pub output: Option<PathBuf>,
}

impl StageReport {
    /// Report of a completed stage
    pub fn completed(name: impl Into<String>, records: usize, output: PathBuf) -> Self {
        Self {
            name: name.into(),
            records,
            status: StageStatus::Completed,
            output: Some(output),
        }
    }

    /// Report of a skipped stage
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: 0,
            status: StageStatus::Skipped {
                reason: reason.into(),
            },
            output: None,
        }
    }

    /// Check if the stage was skipped
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, StageStatus::Skipped { .. })
    }
}

/// Report of a whole job
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    /// Per-stage reports, in run order
    pub stages: Vec<StageReport>,
    /// Search days whose matches exceeded the cap
    pub overflows: Vec<Overflow>,
    /// Checkpoint files removed after the run
    pub checkpoints_cleared: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl JobReport {
    /// Records written across all stages
    pub fn total_records(&self) -> usize {
        self.stages.iter().map(|s| s.records).sum()
    }

    /// Names of skipped stages
    pub fn skipped(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.is_skipped())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Check if every stage completed
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(|s| !s.is_skipped())
    }
}
