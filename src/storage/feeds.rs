use anyhow::Result;

use super::schema::Database;
use super::types::Feed;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Get the feed for a URL, creating it (enabled, no etag) if absent.
    pub async fn get_or_create_feed(&self, url: &str) -> Result<Feed> {
        sqlx::query("INSERT INTO feeds (url) VALUES (?) ON CONFLICT(url) DO NOTHING")
            .bind(url)
            .execute(&self.pool)
            .await?;

        let feed = sqlx::query_as::<_, Feed>(
            "SELECT id, url, etag, enabled FROM feeds WHERE url = ?",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await?;

        Ok(feed)
    }

    /// Look up a feed by URL.
    pub async fn feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(
            "SELECT id, url, etag, enabled FROM feeds WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(feed)
    }

    /// All feeds, ordered by URL.
    pub async fn all_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(
            "SELECT id, url, etag, enabled FROM feeds ORDER BY url",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Feeds eligible for scheduled collection.
    pub async fn enabled_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(
            "SELECT id, url, etag, enabled FROM feeds WHERE enabled = 1 ORDER BY url",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Store the cache validator returned by the last 200-status fetch.
    pub async fn set_feed_etag(&self, feed_id: i64, etag: &str) -> Result<()> {
        sqlx::query("UPDATE feeds SET etag = ? WHERE id = ?")
            .bind(etag)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Enable or disable a feed for scheduled collection.
    pub async fn set_feed_enabled(&self, feed_id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE feeds SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
