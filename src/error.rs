//! Error types for tjs
//!
//! One error enum covering every failure mode of a sync run.
//! Uses thiserror for ergonomic error handling.

use thiserror::Error;

/// Result type alias for tjs operations
pub type Result<T> = std::result::Result<T, TjsError>;

/// Error type for tjs operations
#[derive(Error, Debug)]
pub enum TjsError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Issue not found
    #[error("Issue not found: {0}")]
    IssueNotFound(String),

    /// Rate limited (retry-after duration in seconds)
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Remote tracker rejected a request
    #[error("Integration error: {0}")]
    Integration(String),

    /// Estimate string is not an ISO-8601 duration of the accepted form
    #[error("Malformed duration: {0:?}")]
    MalformedDuration(String),

    /// Local task source failures
    #[error("Task source error: {0}")]
    TaskSource(#[from] taskwarrior::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl TjsError {
    /// Whether the error only concerns the task being processed
    ///
    /// Task-scoped errors are recorded and the pass moves on; anything else
    /// aborts the pass.
    pub fn is_task_scoped(&self) -> bool {
        matches!(self, TjsError::MalformedDuration(_))
    }
}
