//! Template interpolation for stage queries
//!
//! Handles `{{ variable }}` interpolation in search queries and resource
//! paths, e.g. `repo:{{ owner }}/{{ repo }} is:pr created:{{ from }}..{{ to }}`.

use crate::error::{Error, Result};
use crate::types::{JsonValue, StringMap};
use regex::Regex;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable }}
static TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").unwrap());

/// Variables available to a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    vars: StringMap,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context bound to a repository
    pub fn for_repo(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self::new().with("owner", owner).with("repo", repo)
    }

    /// Add a variable
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a variable in place
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Bind the top-level scalar fields of a record
    ///
    /// Variables already bound keep their value; nested fields are ignored.
    #[must_use]
    pub fn with_record(mut self, record: &JsonValue) -> Self {
        let Some(fields) = record.as_object() else {
            return self;
        };
        for (name, value) in fields {
            if self.vars.contains_key(name) {
                continue;
            }
            let value = match value {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                _ => continue,
            };
            self.vars.insert(name.clone(), value);
        }
        self
    }

    /// Get a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Render a template string with the given context
///
/// Every undefined variable is reported in a single error.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = TEMPLATE_REGEX.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        if let Some(value) = ctx.get(name) {
            value.to_string()
        } else {
            if !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
            caps[0].to_string()
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Extract the distinct variable names of a template, in order of appearance
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let name = &cap[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
