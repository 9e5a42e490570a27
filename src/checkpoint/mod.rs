//! Checkpoint module
//!
//! Persists stage progress so a long job can resume after an interruption.
//!
//! # Overview
//!
//! One JSON file per stage, named `.<namespace>_checkpoint_<stage>.json`.
//! Every write goes to a `.tmp` sibling first and is renamed into place, so
//! a crash mid-write leaves the previous checkpoint intact. Unreadable
//! checkpoints are treated as missing.

mod store;
mod types;

pub use store::{CheckpointStore, DEFAULT_NAMESPACE};
pub use types::{ItemProgress, StageRecord, WindowProgress};
