//! Error types for the pageview ingest service

use thiserror::Error;
use warp::http::StatusCode;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors surfaced by one ingest invocation
#[derive(Error, Debug)]
pub enum IngestError {
    /// Empty or malformed page list, or an unusable project name
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The stats provider was unreachable or returned something unusable
    #[error("Upstream fetch failed for '{article}': {source}")]
    UpstreamFetch {
        article: String,
        #[source]
        source: StatsError,
    },

    /// The bulk append to the warehouse failed
    #[error("Storage write failed: {0}")]
    StorageWrite(#[from] SinkError),

    /// Configuration errors (startup only)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status returned to the caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamFetch { .. } => StatusCode::BAD_GATEWAY,
            Self::StorageWrite(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code used in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UpstreamFetch { .. } => "UPSTREAM_FETCH_FAILURE",
            Self::StorageWrite(_) => "STORAGE_WRITE_FAILURE",
            Self::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Name of the structured log event for this failure
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "ingest_invalid_input",
            Self::UpstreamFetch { .. } => "ingest_upstream_fetch_failure",
            Self::StorageWrite(_) => "ingest_storage_write_failure",
            Self::Config(_) => "ingest_config_error",
        }
    }
}

/// Errors from the pageview stats provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for StatsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::MalformedPayload(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

/// Errors from the warehouse sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("warehouse returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{failed_rows} row(s) rejected, first error: {first_error}")]
    InsertErrors { failed_rows: usize, first_error: String },

    #[error("access token unavailable: {0}")]
    Token(#[from] TokenError),

    #[error("{0}")]
    Rejected(String),
}

/// Errors acquiring a warehouse access token
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("metadata server returned an empty token")]
    Empty,
}
