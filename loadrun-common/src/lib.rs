use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod duration;

pub use config::{RunConfig, RunOptions, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_DURATION};
pub use duration::{format_duration, parse_duration};

/// Invalid run configuration. Fatal: nothing is started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("vus must be at least 1, got {0}")]
    InvalidVus(u32),

    #[error("iterations must be at least 1")]
    ZeroIterations,

    #[error("duration must be greater than zero")]
    ZeroDuration,

    #[error("either a duration or an iteration count must be set")]
    MissingTermination,

    #[error("invalid duration {0:?}: {1}")]
    InvalidDuration(String, String),

    #[error("invalid workload: {0}")]
    Workload(String),

    #[error("invalid threshold {0:?}: {1}")]
    Threshold(String, String),
}

/// Network or transport failure of a single request. Recorded, never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Error reading response body: {0}")]
    Body(String),

    #[error("Network error: {0}")]
    Other(String),
}

impl RequestError {
    /// Short label used when grouping errors in the summary.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::InvalidUrl(_) => "invalid_url",
            RequestError::Connect(_) => "connect",
            RequestError::Timeout(_) => "timeout",
            RequestError::Body(_) => "body",
            RequestError::Other(_) => "other",
        }
    }
}

/// Failure of one workload iteration. The iteration is skipped, the VU carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Unexpected status for {url}: expected {expected}, got {}", display_status(.actual))]
    UnexpectedStatus {
        url: String,
        expected: u16,
        actual: Option<u16>,
    },

    #[error("Workload panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Custom(String),
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "no response".to_string(), |s| s.to_string())
}

/// Top-level error for a run that could not be carried out.
#[derive(Debug, Error)]
pub enum LoadRunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// HTTP methods the client pool can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one HTTP request as measured by the client pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestResult {
    pub method: HttpMethod,
    pub url: String,
    /// `None` when no response was received.
    pub status: Option<u16>,
    /// Wall-clock time from send until the full response body was read.
    pub duration: Duration,
    pub bytes_received: u64,
    pub error: Option<RequestError>,
}

impl RequestResult {
    /// A request fails on a transport error or a status outside 200–399.
    pub fn is_failed(&self) -> bool {
        match (&self.error, self.status) {
            (Some(_), _) | (None, None) => true,
            (None, Some(status)) => !(200..400).contains(&status),
        }
    }
}

/// Result type for run setup
pub type Result<T> = std::result::Result<T, LoadRunError>;
