//! Checkpoint payload types

use crate::pagination::Overflow;
use crate::types::JsonValue;
use serde::{Deserialize, Serialize};

/// Result of a whole stage, stored by [`with_checkpoint`]
///
/// [`with_checkpoint`]: super::CheckpointStore::with_checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord<T> {
    /// Whether the stage ran to completion
    pub completed: bool,
    /// Stage output
    pub payload: T,
}

impl<T> StageRecord<T> {
    /// A record of a finished stage
    pub fn completed(payload: T) -> Self {
        Self {
            completed: true,
            payload,
        }
    }
}

/// Progress of a stage that walks a time window slice by slice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowProgress {
    /// What the stage fetches: source, parameters and item filter
    #[serde(default)]
    pub scope: String,
    /// Fingerprint of the slicing the progress belongs to
    pub window: String,
    /// Index of the first slice not yet collected
    pub next_slice: usize,
    /// Records collected so far, in slice order
    pub records: Vec<JsonValue>,
    /// Single-day search overflows met by the collected slices
    #[serde(default)]
    pub overflows: Vec<Overflow>,
    /// Whether every slice has been collected
    #[serde(default)]
    pub completed: bool,
}

impl WindowProgress {
    /// Fresh progress for a window
    pub fn new(window: impl Into<String>) -> Self {
        Self {
            window: window.into(),
            ..Default::default()
        }
    }

    /// Bind the progress to a stage scope
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Check if this progress was recorded for the given scope and slicing
    pub fn matches(&self, scope: &str, window: &str) -> bool {
        self.scope == scope && self.window == window
    }

    /// Record a collected slice
    pub fn push_slice(&mut self, records: impl IntoIterator<Item = JsonValue>) {
        self.records.extend(records);
        self.next_slice += 1;
    }
}

/// Progress of a stage that fetches once per record of an earlier stage
///
/// Saved every few items, so an interruption costs at most the items since
/// the last save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    /// Path template, source stage and item count the progress belongs to
    pub scope: String,
    /// Index of the first item not yet fetched
    pub next_item: usize,
    /// Records collected so far, in item order
    pub records: Vec<JsonValue>,
    /// Whether every item has been fetched
    #[serde(default)]
    pub completed: bool,
}

impl ItemProgress {
    /// Fresh progress for a scope
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Default::default()
        }
    }

    /// Record the children of one item
    pub fn push_item(&mut self, records: impl IntoIterator<Item = JsonValue>) {
        self.records.extend(records);
        self.next_item += 1;
    }
}
