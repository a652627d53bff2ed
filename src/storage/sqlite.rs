//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait,
//! and the sink that binds it to one crawl run.

use crate::post::{PostRecord, VerificationTier};
use crate::scope::QueryScope;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{EmitOutcome, PostSink, Storage, StorageError, StorageResult};
use crate::storage::{LeafRecord, RunRecord, RunStatus};
use crate::SieveError;
use chrono::{NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// Storage format of post and window timestamps (site-local time)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

const POST_COLUMNS: &str = "id, bid, author_id, author_name, text, article_url, topics,
    mentioned_users, repost_count, comment_count, like_count, created_at, source_client,
    image_urls, video_url, origin_post_id, position, ip_location, verification_tier";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SieveError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SieveError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, SieveError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn read_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(RunStatus::Running),
            error_message: row.get(5)?,
        })
    }

    fn read_post(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
        let created_at: Option<String> = row.get(11)?;
        Ok(PostRecord {
            id: row.get(0)?,
            bid: row.get(1)?,
            author_id: row.get(2)?,
            author_name: row.get(3)?,
            text: row.get(4)?,
            article_url: row.get(5)?,
            topics: json_list(row, 6)?,
            mentioned_users: json_list(row, 7)?,
            repost_count: row.get::<_, i64>(8)?.max(0) as u64,
            comment_count: row.get::<_, i64>(9)?.max(0) as u64,
            like_count: row.get::<_, i64>(10)?.max(0) as u64,
            created_at: created_at
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok()),
            source_client: row.get(12)?,
            image_urls: json_list(row, 13)?,
            video_url: row.get(14)?,
            origin_post_id: row.get(15)?,
            position: row.get(16)?,
            ip_location: row.get(17)?,
            author_verification_tier: VerificationTier::from_db_string(
                &row.get::<_, String>(18)?,
            )
            .unwrap_or_default(),
        })
    }
}

/// Decodes a JSON array column
fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, error_message
             FROM runs WHERE id = ?1",
        )?;

        stmt.query_row(params![run_id], Self::read_run)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, error_message
             FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        Ok(stmt.query_row([], Self::read_run).optional()?)
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    fn fail_run(&mut self, run_id: i64, message: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, error_message = ?3 WHERE id = ?4",
            params![RunStatus::Failed.to_db_string(), now, message, run_id],
        )?;
        Ok(())
    }

    // ===== Posts =====

    fn insert_post(
        &mut self,
        record: &PostRecord,
        keyword: &str,
        run_id: i64,
    ) -> StorageResult<EmitOutcome> {
        if record.id.is_empty() {
            return Err(StorageError::ConstraintViolation(
                "post id must not be empty".to_string(),
            ));
        }

        let topics = serde_json::to_string(&record.topics)?;
        let mentioned_users = serde_json::to_string(&record.mentioned_users)?;
        let image_urls = serde_json::to_string(&record.image_urls)?;
        let created_at = record
            .created_at
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string());
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO posts (id, bid, author_id, author_name, text, article_url,
                topics, mentioned_users, repost_count, comment_count, like_count, created_at,
                source_client, image_urls, video_url, origin_post_id, position, ip_location,
                verification_tier, first_seen_run, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21)",
            params![
                record.id,
                record.bid,
                record.author_id,
                record.author_name,
                record.text,
                record.article_url,
                topics,
                mentioned_users,
                saturating_i64(record.repost_count),
                saturating_i64(record.comment_count),
                saturating_i64(record.like_count),
                created_at,
                record.source_client,
                image_urls,
                record.video_url,
                record.origin_post_id,
                record.position,
                record.ip_location,
                record.author_verification_tier.to_db_string(),
                run_id,
                now,
            ],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO post_keywords (post_id, keyword, run_id) VALUES (?1, ?2, ?3)",
            params![record.id, keyword, run_id],
        )?;
        tx.commit()?;

        Ok(if inserted > 0 {
            EmitOutcome::Inserted
        } else {
            EmitOutcome::Duplicate
        })
    }

    fn get_post(&self, id: &str) -> StorageResult<Option<PostRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS))?;
        Ok(stmt.query_row(params![id], Self::read_post).optional()?)
    }

    fn get_post_keywords(&self, id: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT keyword FROM post_keywords WHERE post_id = ?1 ORDER BY id")?;
        let keywords = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keywords)
    }

    fn get_posts_by_keyword(&self, keyword: &str) -> StorageResult<Vec<PostRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM posts
             JOIN (SELECT post_id, id AS link_id FROM post_keywords WHERE keyword = ?1) k
               ON k.post_id = posts.id
             ORDER BY k.link_id",
            POST_COLUMNS
        ))?;
        let posts = stmt
            .query_map(params![keyword], Self::read_post)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    // ===== Leaf Scopes =====

    fn insert_leaf(
        &mut self,
        run_id: i64,
        scope: &QueryScope,
        pages: u32,
        lossy: bool,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO leaf_scopes (run_id, keyword, window_start, window_end, region,
                sub_region, pages, lossy, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                scope.keyword(),
                scope.window().start().format(TIMESTAMP_FORMAT).to_string(),
                scope.window().end().format(TIMESTAMP_FORMAT).to_string(),
                scope.region(),
                scope.sub_region(),
                pages,
                lossy,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_lossy_leaves(&self, run_id: i64) -> StorageResult<Vec<LeafRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, keyword, window_start, window_end, region, sub_region, pages, lossy
             FROM leaf_scopes WHERE run_id = ?1 AND lossy = 1 ORDER BY id",
        )?;
        let leaves = stmt
            .query_map(params![run_id], |row| {
                Ok(LeafRecord {
                    run_id: row.get(0)?,
                    keyword: row.get(1)?,
                    window_start: row.get(2)?,
                    window_end: row.get(3)?,
                    region: row.get(4)?,
                    sub_region: row.get(5)?,
                    pages: row.get(6)?,
                    lossy: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(leaves)
    }

    // ===== Statistics =====

    fn count_posts(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_reposts(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE origin_post_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_posts_by_keyword(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT keyword, COUNT(*) AS n FROM post_keywords
             GROUP BY keyword ORDER BY n DESC, keyword",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    fn get_verification_breakdown(&self) -> StorageResult<HashMap<VerificationTier, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT verification_tier, COUNT(*) FROM posts GROUP BY verification_tier")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut breakdown = HashMap::new();
        for row in rows {
            let (tier, count) = row?;
            if let Some(tier) = VerificationTier::from_db_string(&tier) {
                *breakdown.entry(tier).or_insert(0) += count as u64;
            }
        }
        Ok(breakdown)
    }

    fn count_leaves(&self) -> StorageResult<(u64, u64)> {
        let (total, lossy): (i64, Option<i64>) = self.conn.query_row(
            "SELECT COUNT(*), SUM(lossy) FROM leaf_scopes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((total as u64, lossy.unwrap_or(0) as u64))
    }
}

/// Sink that stores every emitted post under one crawl run
pub struct SqliteSink {
    storage: SqliteStorage,
    run_id: i64,
}

impl SqliteSink {
    pub fn new(storage: SqliteStorage, run_id: i64) -> Self {
        Self { storage, run_id }
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }
}

impl PostSink for SqliteSink {
    fn emit(&mut self, record: &PostRecord, keyword: &str) -> StorageResult<EmitOutcome> {
        self.storage.insert_post(record, keyword, self.run_id)
    }

    fn record_leaf(&mut self, scope: &QueryScope, pages: u32, lossy: bool) -> StorageResult<()> {
        self.storage.insert_leaf(self.run_id, scope, pages, lossy)
    }
}
