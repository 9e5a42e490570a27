//! Common types used throughout repo-harvest
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// Ordered string map, used for query parameters so requests are reproducible
pub type StringMap = BTreeMap<String, String>;

/// Lazy, finite, non-restartable sequence of fetched records
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<JsonValue>> + Send>>;

// ============================================================================
// Endpoint Kind
// ============================================================================

/// The two list endpoint families of the upstream API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// JSON array body, `Link: rel="next"` pagination
    ResourceList,
    /// `{total_count, items}` body, capped page-number pagination
    Search,
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceList => write!(f, "resource_list"),
            Self::Search => write!(f, "search"),
        }
    }
}

// ============================================================================
// Item Kind
// ============================================================================

/// Kind of item returned by the issue search endpoint
///
/// Issue search returns issues and pull requests together; pull requests are
/// the items carrying a `pull_request` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Keep every item
    #[default]
    Any,
    /// Keep only pull requests
    PullRequest,
    /// Keep only plain issues
    Issue,
}

impl ItemKind {
    /// Check whether a record is of this kind
    pub fn matches(&self, record: &JsonValue) -> bool {
        let is_pr = record.get("pull_request").is_some();
        match self {
            Self::Any => true,
            Self::PullRequest => is_pr,
            Self::Issue => !is_pr,
        }
    }
}
