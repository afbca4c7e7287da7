//! Error types for tagsync
//!
//! Provides error handling for:
//! - Configuration loading
//! - Single GraphQL calls (transport and protocol failures)
//! - Pagination
//! - Per-record reconciliation
//! - Result persistence
//! - Whole-run failures

use crate::types::RecordId;
use std::path::PathBuf;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required setting absent from file and environment
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    /// Setting present but out of range
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// `.env` file exists but could not be read
    #[error("invalid dotenv file {path}: {source}")]
    Dotenv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

impl ConfigError {
    /// Create invalid-value error
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Failure below the HTTP status line: the request never produced a response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// Connection, TLS or body-read failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its timeout
    #[error("request timed out")]
    Timeout,
}

/// Failure of one GraphQL call, after the retry policy has been applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network failure on the last attempt
    #[error(transparent)]
    Network(#[from] EndpointError),

    /// Response body was not JSON
    #[error("undecodable response body: {0}")]
    Decode(String),

    /// Still rate limited when the attempt budget ran out
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// HTTP 200 carrying a top-level `errors` array
    #[error("graphql errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// Any status other than 200 and 429
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Attempt budget exhausted without a definitive answer
    #[error("gave up after {attempts} attempts: {last}")]
    AttemptsExhausted {
        attempts: u32,
        last: Box<TransportError>,
    },

    /// Run was cancelled while waiting to retry
    #[error("cancelled while waiting to retry")]
    Cancelled,
}

impl TransportError {
    /// Check if another attempt could succeed
    ///
    /// Only rate limiting and transient failures are worth another attempt.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Decode(_) | Self::RateLimited { .. }
        )
    }
}

/// Pagination errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    /// Page request failed
    #[error("failed to fetch page {page}: {source}")]
    PageFailed {
        page: usize,
        #[source]
        source: TransportError,
    },

    /// Server reported another page without giving an unseen cursor
    #[error("page {page} reported a next page without advancing the cursor")]
    StalledCursor { page: usize },

    /// Walk stopped on cancellation before requesting `page`
    #[error("cancelled before page {page}")]
    Cancelled { page: usize },
}

/// A `userErrors` entry returned by a mutation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserError {
    /// Input path the error refers to
    #[serde(default)]
    pub field: Option<Vec<String>>,
    /// Human-readable message
    pub message: String,
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(path) if !path.is_empty() => write!(f, "{}: {}", path.join("."), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Why reconciliation of a single record failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Could not read current tags before deciding
    #[error("failed to get current tags: {0}")]
    ReadTags(#[source] TransportError),

    /// Tag mutation call failed
    #[error("failed to update tags: {0}")]
    UpdateTags(#[source] TransportError),

    /// Mutation went through but the store rejected the input
    #[error("store rejected tag update: {}", join_user_errors(.0))]
    UserErrors(Vec<UserError>),

    /// Unexpected fault while reconciling
    #[error("reconciliation panicked: {0}")]
    Panicked(String),
}

fn join_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A record that could not be reconciled
#[derive(Debug, Clone, thiserror::Error)]
#[error("order {name} ({id}) failed: {error}")]
pub struct RecordFailure {
    /// Record identifier
    pub id: RecordId,
    /// Record display name
    pub name: String,
    /// Underlying cause
    pub error: ReconcileError,
}

/// Result persistence errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// File system failure
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialized
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Whole-run errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Pagination produced no records at all
    #[error("no orders fetched")]
    NothingFetched {
        /// Why pagination stopped, if it failed
        cause: Option<PaginationError>,
    },

    /// Cancelled before any record was dispatched
    #[error("run cancelled after fetching {fetched} orders")]
    Cancelled {
        /// Records fetched before the walk stopped
        fetched: usize,
    },
}
