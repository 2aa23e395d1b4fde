use anyhow::Result;
use std::collections::HashSet;

use super::schema::Database;
use super::types::Entry;

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// All uid hashes already stored for a feed.
    ///
    /// Seeds the dedup working set at the start of a fetch; it is not
    /// re-queried while the fetch runs (single-flight-per-feed is a caller
    /// precondition).
    pub async fn entry_hashes(&self, feed_id: i64) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT uid_hash FROM entries WHERE feed_id = ?")
                .bind(feed_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    /// Insert one entry and return its row id.
    ///
    /// Entries are written individually, never batched: one oversized batch
    /// can fail atomically and lose every entry of the fetch, while
    /// per-entry writes isolate a failure to that entry. A UNIQUE violation
    /// on `(feed_id, uid_hash)` surfaces here as an error the caller turns
    /// into a per-entry diagnostic.
    pub async fn insert_entry(
        &self,
        feed_id: i64,
        fetch_status_id: i64,
        xml: &str,
        uid_hash: &str,
        created_at: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO entries (feed_id, fetch_status_id, xml, uid_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(feed_id)
        .bind(fetch_status_id)
        .bind(xml)
        .bind(uid_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All entries for a feed, oldest first.
    pub async fn entries_for_feed(&self, feed_id: i64) -> Result<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, feed_id, fetch_status_id, xml, uid_hash, created_at
            FROM entries
            WHERE feed_id = ?
            ORDER BY id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
