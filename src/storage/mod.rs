//! Storage module for persisting crawl results
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Idempotent post storage keyed by post id
//! - Keyword membership of every stored post
//! - Run and leaf-scope bookkeeping

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SqliteSink, SqliteStorage};
pub use traits::{EmitOutcome, PostSink, Storage, StorageError, StorageResult};

use crate::SieveError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SieveError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SieveError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

/// Represents a walked leaf scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRecord {
    pub run_id: i64,
    pub keyword: String,
    pub window_start: String,
    pub window_end: String,
    pub region: Option<u32>,
    pub sub_region: Option<u32>,
    pub pages: u32,
    pub lossy: bool,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
