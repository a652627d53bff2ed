//! Storage traits and error types
//!
//! This module defines the sink the crawl driver emits into, the storage
//! backend interface behind it, and the associated error types.

use crate::post::{PostRecord, VerificationTier};
use crate::scope::QueryScope;
use crate::storage::{LeafRecord, RunRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What happened to an emitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The record was stored for the first time
    Inserted,
    /// A record with the same id was already stored; nothing changed
    Duplicate,
}

/// Destination for extracted posts
///
/// Records are keyed by id: emitting the same id again must not create a
/// second stored record. Any error is treated by the driver as fatal for the
/// rest of the run.
pub trait PostSink {
    /// Stores one record found while searching for `keyword`
    fn emit(&mut self, record: &PostRecord, keyword: &str) -> StorageResult<EmitOutcome>;

    /// Notes a leaf scope once its pages have been walked
    fn record_leaf(&mut self, _scope: &QueryScope, _pages: u32, _lossy: bool) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler and by
/// the statistics report.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    /// Marks a run as failed, keeping the diagnostic
    fn fail_run(&mut self, run_id: i64, message: &str) -> StorageResult<()>;

    // ===== Posts =====

    /// Stores a post unless one with the same id exists, and links it to
    /// the keyword it was found under
    fn insert_post(
        &mut self,
        record: &PostRecord,
        keyword: &str,
        run_id: i64,
    ) -> StorageResult<EmitOutcome>;

    /// Gets a post by id
    fn get_post(&self, id: &str) -> StorageResult<Option<PostRecord>>;

    /// Keywords a post was found under, in insertion order
    fn get_post_keywords(&self, id: &str) -> StorageResult<Vec<String>>;

    /// Posts found under a keyword, in the order they were first linked to it
    fn get_posts_by_keyword(&self, keyword: &str) -> StorageResult<Vec<PostRecord>>;

    // ===== Leaf Scopes =====

    /// Records a walked leaf scope
    fn insert_leaf(
        &mut self,
        run_id: i64,
        scope: &QueryScope,
        pages: u32,
        lossy: bool,
    ) -> StorageResult<()>;

    /// Gets the leaves walked by a run that were still over the threshold
    fn get_lossy_leaves(&self, run_id: i64) -> StorageResult<Vec<LeafRecord>>;

    // ===== Statistics =====

    /// Gets total post count
    fn count_posts(&self) -> StorageResult<u64>;

    /// Counts posts that repost another stored post
    fn count_reposts(&self) -> StorageResult<u64>;

    /// Gets post counts per keyword, most frequent first
    fn count_posts_by_keyword(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Gets post counts per author verification tier
    fn get_verification_breakdown(&self) -> StorageResult<HashMap<VerificationTier, u64>>;

    /// Counts leaf scopes, returning `(total, lossy)`
    fn count_leaves(&self) -> StorageResult<(u64, u64)>;
}
