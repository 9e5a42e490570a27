//! CLI commands and argument parsing

use crate::types::ItemKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Repository history harvester
#[derive(Parser, Debug)]
#[command(name = "repo-harvest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// API token (sent as a bearer token)
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the slices a window is cut into
    Slices {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Print the total number of matches of a search query
    Count {
        /// Search query, e.g. "repo:rust-lang/cargo is:pr"
        query: String,
    },

    /// Collect a repository resource list such as `commits`
    Resource {
        /// Repository owner
        owner: String,

        /// Repository name
        repo: String,

        /// Resource under `repos/{owner}/{repo}/`
        resource: String,

        #[command(flatten)]
        window: WindowArgs,

        /// Output file (JSON lines), stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Collect the matches of a search template, split by creation date
    Search {
        /// Query template containing `{{ from }}` and `{{ to }}`
        query: String,

        #[command(flatten)]
        window: WindowArgs,

        /// Keep only items of this kind
        #[arg(long, value_enum, default_value = "any")]
        item_kind: ItemFilter,

        /// Output file (JSON lines), stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a YAML job
    Run {
        /// Job file
        job: PathBuf,

        /// Override the job's output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Remove every checkpoint of a YAML job
    Clear {
        /// Job file
        job: PathBuf,
    },
}

/// Time window arguments
#[derive(clap::Args, Debug, Clone)]
pub struct WindowArgs {
    /// Window start (inclusive), e.g. 2023-01-01
    #[arg(long)]
    pub since: String,

    /// Window end (exclusive)
    #[arg(long)]
    pub until: String,

    /// Slice length in months
    #[arg(long, default_value = "1")]
    pub months: u32,
}

/// Item kind filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ItemFilter {
    /// Keep everything
    Any,
    /// Pull requests only
    PullRequest,
    /// Issues only
    Issue,
}

impl From<ItemFilter> for ItemKind {
    fn from(filter: ItemFilter) -> Self {
        match filter {
            ItemFilter::Any => ItemKind::Any,
            ItemFilter::PullRequest => ItemKind::PullRequest,
            ItemFilter::Issue => ItemKind::Issue,
        }
    }
}
