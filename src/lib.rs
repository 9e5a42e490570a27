// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Repo Harvest
//!
//! Collects the history of a GitHub repository over a time window: commits,
//! pull requests, issues and comments, without losing records to the search
//! API's 1000-result cap.
//!
//! ## Features
//!
//! - **Rate-Limit Aware Transport**: waits out primary and secondary limits,
//!   retries 5xx with capped exponential backoff and jitter
//! - **Two Endpoint Families**: `Link`-header walking for resource lists, page
//!   numbers for search
//! - **Range Splitting**: search windows over the cap are bisected by date
//! - **Time Slicing**: long windows are cut into month slices
//! - **Checkpoints**: atomic per-stage files, resumable slice by slice
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use repo_harvest::{Harvester, HttpClient, SearchTemplate, TimeWindow, Result};
//! use futures::TryStreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let harvester = Harvester::new(HttpClient::new()?);
//!     let window = TimeWindow::parse("2023-01-01", "2024-01-01")?;
//!
//!     let template = SearchTemplate::new(
//!         "repo:rust-lang/cargo is:pr created:{{ from }}..{{ to }}",
//!     )?;
//!     let prs: Vec<_> = harvester
//!         .fetch_search_window(&template, &window, 3)
//!         .try_collect()
//!         .await?;
//!
//!     println!("{} pull requests", prs.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  JobRunner / CLI (YAML stages)                  │
//! │   run() → JobReport          collect_window() → Checkpoints     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────────┬───────────────┴───────────────┬──────────────────┐
//! │    Window    │          Pagination           │    Checkpoint    │
//! ├──────────────┼───────────────────────────────┼──────────────────┤
//! │ Month slices │ CursorPaginator (Link header) │ Atomic save      │
//! │ Date ranges  │ CappedSearchPaginator         │ Window progress  │
//! │              │ RangeSplitter (bisection)     │ Item progress    │
//! └──────────────┴───────────────┬───────────────┴──────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          HttpClient: rate limits, retry, backoff, pacing        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// HTTP client with retry and rate limiting
pub mod http;

/// Pagination strategies and range splitting
pub mod pagination;

/// Time windows and slices
pub mod window;

/// Checkpoint persistence
pub mod checkpoint;

/// Main execution engine
pub mod engine;

/// Job configuration
pub mod config;

/// Template interpolation
pub mod template;

/// Command-line interface
pub mod cli;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use checkpoint::CheckpointStore;
pub use config::{load_job, load_job_from_str, JobConfig};
pub use engine::{collect_each, collect_window, Harvester, JobReport, JobRunner, WindowCollector};
pub use http::{HttpClient, HttpClientConfig};
pub use pagination::{Overflow, SearchTemplate};
pub use window::{TimeSlice, TimeWindow};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
