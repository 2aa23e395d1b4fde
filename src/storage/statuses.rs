use anyhow::Result;

use super::schema::Database;
use super::types::{FetchStatus, FetchStatusUpdate};

impl Database {
    // ========================================================================
    // Fetch Status Operations
    // ========================================================================

    /// Create the status row for a fetch attempt, before any network I/O.
    ///
    /// The row must exist up front so entries created during the fetch can
    /// reference it, and so a crash mid-fetch still leaves an attempt record.
    /// Returns the new row id.
    pub async fn create_fetch_status(&self, feed_id: i64, timestamp_start: i64) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO fetch_statuses (feed_id, timestamp_start) VALUES (?, ?)",
        )
        .bind(feed_id)
        .bind(timestamp_start)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Write the final state of a fetch attempt.
    ///
    /// Called exactly once per fetch, at the very end, so the row carries
    /// the complete diagnostic string.
    pub async fn finalize_fetch_status(&self, status_id: i64, update: &FetchStatusUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fetch_statuses
            SET http_status_code = ?, size_bytes = ?, timestamp_end = ?,
                nb_entries = ?, nb_new_entries = ?, error_msg = ?
            WHERE id = ?
        "#,
        )
        .bind(update.http_status_code)
        .bind(update.size_bytes)
        .bind(update.timestamp_end)
        .bind(update.nb_entries)
        .bind(update.nb_new_entries)
        .bind(&update.error_msg)
        .bind(status_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load one fetch status row.
    pub async fn fetch_status(&self, status_id: i64) -> Result<Option<FetchStatus>> {
        let status = sqlx::query_as::<_, FetchStatus>(
            r#"
            SELECT id, feed_id, http_status_code, size_bytes, timestamp_start,
                   timestamp_end, nb_entries, nb_new_entries, error_msg
            FROM fetch_statuses
            WHERE id = ?
        "#,
        )
        .bind(status_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status)
    }

    /// All fetch attempts for a feed, oldest first.
    pub async fn statuses_for_feed(&self, feed_id: i64) -> Result<Vec<FetchStatus>> {
        let statuses = sqlx::query_as::<_, FetchStatus>(
            r#"
            SELECT id, feed_id, http_status_code, size_bytes, timestamp_start,
                   timestamp_end, nb_entries, nb_new_entries, error_msg
            FROM fetch_statuses
            WHERE feed_id = ?
            ORDER BY timestamp_start
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(statuses)
    }
}
