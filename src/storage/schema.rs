//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Sieve database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT
);

-- One row per post id; list fields are JSON arrays
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    bid TEXT NOT NULL,
    author_id TEXT NOT NULL,
    author_name TEXT NOT NULL,
    text TEXT NOT NULL,
    article_url TEXT NOT NULL,
    topics TEXT NOT NULL,
    mentioned_users TEXT NOT NULL,
    repost_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    like_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    source_client TEXT NOT NULL,
    image_urls TEXT NOT NULL,
    video_url TEXT NOT NULL,
    origin_post_id TEXT,
    position TEXT NOT NULL,
    ip_location TEXT NOT NULL,
    verification_tier TEXT NOT NULL,
    first_seen_run INTEGER NOT NULL REFERENCES runs(id),
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
CREATE INDEX IF NOT EXISTS idx_posts_origin ON posts(origin_post_id);

-- Which keywords a post was found under
CREATE TABLE IF NOT EXISTS post_keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id TEXT NOT NULL REFERENCES posts(id),
    keyword TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    UNIQUE(post_id, keyword)
);

CREATE INDEX IF NOT EXISTS idx_post_keywords_keyword ON post_keywords(keyword);

-- Leaf scopes walked page by page
CREATE TABLE IF NOT EXISTS leaf_scopes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    keyword TEXT NOT NULL,
    window_start TEXT NOT NULL,
    window_end TEXT NOT NULL,
    region INTEGER,
    sub_region INTEGER,
    pages INTEGER NOT NULL,
    lossy INTEGER NOT NULL DEFAULT 0,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leaf_scopes_run ON leaf_scopes(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["runs", "posts", "post_keywords", "leaf_scopes"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
