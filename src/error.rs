//! Error types for repo-harvest
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Rate limiting never shows up here: the transport absorbs it by sleeping
//! until the server-declared reset.

use thiserror::Error;

/// Maximum number of response body characters kept in a rejection error
pub const MAX_ERROR_BODY_CHARS: usize = 300;

/// The main error type for repo-harvest
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Fetch Errors
    // ============================================================================
    /// Transient faults (5xx, connection resets, timeouts) outlasted the retry budget
    #[error("Fetch failed for {url} after {attempts} attempts (last status: {}): {message}", display_status(.status))]
    FetchFailure {
        url: String,
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    /// Non-retryable client fault (4xx other than rate limiting)
    #[error("Request to {url} rejected with HTTP {status}: {body}")]
    RequestRejected {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body did not match the shape expected for the endpoint kind
    #[error("Unexpected response shape from {url}: {message}")]
    UnexpectedShape { url: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Checkpoint Errors
    // ============================================================================
    #[error("Checkpoint '{stage}' failed: {message}")]
    Checkpoint { stage: String, message: String },

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a fetch failure error
    pub fn fetch_failure(
        url: impl Into<String>,
        status: Option<u16>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::FetchFailure {
            url: url.into(),
            status,
            attempts,
            message: message.into(),
        }
    }

    /// Create a request rejected error, truncating the body
    pub fn request_rejected(url: impl Into<String>, status: u16, body: &str) -> Self {
        Self::RequestRejected {
            url: url.into(),
            status,
            body: truncate_body(body),
        }
    }

    /// Create an unexpected shape error
    pub fn unexpected_shape(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedShape {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::FetchFailure { status, .. } => *status,
            Error::RequestRejected { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is a fetch-level failure a caller may choose to skip
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Error::FetchFailure { .. } | Error::RequestRejected { .. }
        )
    }

    /// Check if this error is a transient transport fault worth retrying
    ///
    /// Covers timeouts, refused or dropped connections, and bodies cut off
    /// mid-read. HTTP statuses are classified by the transport itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            _ => false,
        }
    }
}

/// Check if an HTTP status code is retryable
pub(crate) fn is_retryable_status(status: u16) -> bool {
    (500..=599).contains(&status)
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Result type alias for repo-harvest
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
