// src/error.rs

//! Unified error handling for the standings pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream answered with a non-success status after all attempts
    #[error("Failed GET {url} with code {code}: {response}")]
    FailOnGetResponse {
        code: u16,
        url: String,
        response: String,
    },

    /// Plugin could not turn upstream data into standings for this contest
    #[error("Parse standings error for {contest}: {message}")]
    ParseStandings { contest: String, message: String },

    /// Proxy pool used up its per-run budget
    #[error("Proxy limit reached ({limit} uses)")]
    ProxyLimitReached { limit: usize },

    /// No plugin registered for a resource module
    #[error("No plugin registered for module '{0}'")]
    PluginNotFound(String),

    /// Plugin does not implement an optional capability
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Incoming data cannot be mapped onto persisted state
    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),

    /// Entity lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// A parallel batch gave up after repeated failures
    #[error("Batch aborted: {0}")]
    BatchAborted(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a standings parse error with contest context.
    pub fn parse_standings(contest: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ParseStandings {
            contest: contest.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// HTTP status carried by a failed fetch, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::FailOnGetResponse { code, .. } => Some(*code),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Upstream reports the entity as gone.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Contest-level failure: retry later, keep the batch going.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            Self::ParseStandings { .. } | Self::FailOnGetResponse { .. } | Self::Http(_)
        )
    }

    /// Stops the remaining pass for the current resource.
    pub fn is_fatal_for_resource(&self) -> bool {
        matches!(self, Self::ProxyLimitReached { .. })
    }
}
