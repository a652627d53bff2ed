//! Sumi-Sieve: a partitioning search crawler
//!
//! This crate crawls a paginated social-media search engine for posts that
//! match keywords over a date range. Result sets too large for the backend's
//! pagination are recursively narrowed by time, province and city until every
//! partition can be walked page by page.

pub mod config;
pub mod crawler;
pub mod output;
pub mod post;
pub mod region;
pub mod scope;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Sieve operations
#[derive(Debug, Error)]
pub enum SieveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session rejected at {url}: {reason}")]
    SessionInvalid { url: String, reason: String },

    #[error("Network failure for {url} after {attempts} attempt(s): {message}")]
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Sink rejected post {post_id}: {source}")]
    SinkUnavailable {
        post_id: String,
        source: storage::StorageError,
    },

    #[error("Crawl stopped at scope [{scope}]: {source}")]
    ScopeFailed {
        scope: String,
        source: Box<SieveError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SieveError {
    /// Returns true when the failure came from a rejected session cookie,
    /// looking through scope wrappers
    pub fn is_session_failure(&self) -> bool {
        match self {
            Self::SessionInvalid { .. } => true,
            Self::ScopeFailed { source, .. } => source.is_session_failure(),
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown region: {0}")]
    UnknownRegion(String),
}

/// Result type alias for Sumi-Sieve operations
pub type Result<T> = std::result::Result<T, SieveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use post::PostRecord;
pub use region::RegionTable;
pub use scope::{QueryScope, TimeWindow};
