//! Error types.
//!
//! Per-record failures ([`QueryError`]) never escape a batch; they are
//! reported through [`QueryFailure`] on the correlator's failure sink.
//! [`CorrelateError`] is reserved for input rejected before dispatch.

use crate::model::PackageRecord;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Failure of a single package query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("request exceeded the {0:?} deadline")]
    Timeout(Duration),
    #[error("service responded with {0}")]
    Status(StatusCode),
    #[error("malformed component analysis report: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("batch canceled")]
    Canceled,
}

impl QueryError {
    /// Classifies a reqwest error, separating deadline expiry from other
    /// transport failures.
    pub(crate) fn from_reqwest(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            QueryError::Timeout(deadline)
        } else {
            QueryError::Transport(err)
        }
    }
}

/// A per-record failure, tagged with the record it belongs to.
#[derive(Debug)]
pub struct QueryFailure {
    pub record: Arc<PackageRecord>,
    pub error: QueryError,
}

impl std::fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.record.id, self.record, self.error)
    }
}

/// A batch that could not be dispatched at all.
#[derive(Debug, thiserror::Error)]
pub enum CorrelateError {
    #[error("record id {0:?} appears more than once in the batch")]
    DuplicateId(String),
}

/// Invalid matcher configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid service url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("request timeout must be greater than zero")]
    InvalidTimeout,
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A matcher set could not be changed.
#[derive(Debug, thiserror::Error)]
pub enum MatcherSetError {
    #[error("reused matcher names: {}", .0.join(", "))]
    Exists(Vec<String>),
    #[error("invalid matcher name pattern: {0}")]
    Pattern(#[from] regex::Error),
}
