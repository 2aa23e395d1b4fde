use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Migration` if the schema could not be
    /// created, `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Configure SQLite connection options with busy_timeout pragma.
        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Using pragma() ensures all connections
        // in the pool inherit this setting.
        let options = SqliteConnectOptions::from_str(&url)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);
        // SQLite is single-writer; 5 connections covers the sequential fetch
        // loop plus concurrent subscribe/unsubscribe calls.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All schema changes are wrapped in a single transaction so a failure
    /// mid-migration leaves the database in its previous consistent state.
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                url TEXT UNIQUE NOT NULL,
                etag TEXT,
                enabled INTEGER NOT NULL DEFAULT 1
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // One row per fetch attempt, anchored by timestamp_start which is set
        // before any network I/O happens.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fetch_statuses (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                http_status_code INTEGER,
                size_bytes INTEGER,
                timestamp_start INTEGER NOT NULL,
                timestamp_end INTEGER,
                nb_entries INTEGER,
                nb_new_entries INTEGER,
                error_msg TEXT,
                UNIQUE(feed_id, timestamp_start)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Append-only log of observed entries; (feed_id, uid_hash) is the
        // dedup key enforced at the storage layer.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                fetch_status_id INTEGER NOT NULL REFERENCES fetch_statuses(id) ON DELETE CASCADE,
                xml TEXT NOT NULL,
                uid_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(feed_id, uid_hash)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Durable callback registrations, keyed (feed_id, dispatch_uid) to
        // match the live bus registration key.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                handler_key TEXT NOT NULL,
                dispatch_uid TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(feed_id, dispatch_uid)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_statuses_feed_start ON fetch_statuses(feed_id, timestamp_start)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_feed_hash ON entries(feed_id, uid_hash)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_status ON entries(fetch_status_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscriptions_feed ON subscriptions(feed_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
