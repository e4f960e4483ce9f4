//! Error handling for the gateway

use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, KickstartError>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum KickstartError {
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("crawl error: {0}")]
    Crawl(#[from] CrawlError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised while building or querying the vector index
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("no text could be extracted from {0}")]
    EmptyExtraction(String),

    #[error("failed to read PDF {path}: {reason}")]
    Pdf { path: String, reason: String },

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Errors raised during a web crawl; per-URL failures are logged and
/// the crawl continues
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("request to {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised by backend process lifecycle operations
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("no endpoint configuration found for '{0}'")]
    UnknownEndpoint(String),

    #[error("a process named '{0}' already exists")]
    NameConflict(String),

    #[error("backend executable not found at {0}")]
    ExecutableMissing(String),

    #[error("failed to spawn backend for '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    #[error("no process found with name '{0}'")]
    UnknownProcess(String),
}

impl KickstartError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            KickstartError::Retrieval(_) => "retrieval",
            KickstartError::Crawl(_) => "crawl",
            KickstartError::Supervisor(_) => "supervisor",
            KickstartError::Config(_) => "config",
            KickstartError::Upstream(_) => "upstream",
            KickstartError::Io(_) => "io",
            KickstartError::Serialization(_) => "serialization",
            KickstartError::Http(_) => "http",
        }
    }
}
