//! CLI module
//!
//! Command-line interface for harvesting a repository.
//!
//! # Commands
//!
//! - `slices` - Show how a window is sliced
//! - `count` - Count the matches of a search query
//! - `resource` - Collect a resource list over a window
//! - `search` - Collect search matches over a window
//! - `run` - Run a YAML job
//! - `clear` - Remove a job's checkpoints

mod commands;
mod runner;

pub use commands::{Cli, Commands, ItemFilter, WindowArgs};
pub use runner::Runner;
