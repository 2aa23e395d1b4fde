use anyhow::Result;

use super::schema::Database;
use super::types::Subscription;

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Get or create the subscription row for `(feed_id, dispatch_uid)`.
    ///
    /// Returns the row and whether it was created by this call. Callers go
    /// through [`crate::hub::Hub`], which is responsible for loading the row
    /// into the notification bus afterwards.
    pub async fn get_or_create_subscription(
        &self,
        feed_id: i64,
        handler_key: &str,
        dispatch_uid: &str,
        created_at: i64,
    ) -> Result<(Subscription, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO subscriptions (feed_id, handler_key, dispatch_uid, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(feed_id, dispatch_uid) DO NOTHING
        "#,
        )
        .bind(feed_id)
        .bind(handler_key)
        .bind(dispatch_uid)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, feed_id, handler_key, dispatch_uid, created_at
            FROM subscriptions
            WHERE feed_id = ? AND dispatch_uid = ?
        "#,
        )
        .bind(feed_id)
        .bind(dispatch_uid)
        .fetch_one(&self.pool)
        .await?;

        Ok((sub, inserted))
    }

    /// Look up a subscription by its end-to-end key.
    pub async fn find_subscription(
        &self,
        feed_id: i64,
        dispatch_uid: &str,
    ) -> Result<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, feed_id, handler_key, dispatch_uid, created_at
            FROM subscriptions
            WHERE feed_id = ? AND dispatch_uid = ?
        "#,
        )
        .bind(feed_id)
        .bind(dispatch_uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    /// Delete one subscription row.
    ///
    /// Storage-level delete only — every caller must have unloaded the
    /// registration from the bus first, otherwise the bus retains a stale
    /// registration referencing a deleted row.
    pub async fn delete_subscription(&self, subscription_id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    /// All subscriptions for one feed, in registration order.
    pub async fn subscriptions_for_feed(&self, feed_id: i64) -> Result<Vec<Subscription>> {
        let subs = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, feed_id, handler_key, dispatch_uid, created_at
            FROM subscriptions
            WHERE feed_id = ?
            ORDER BY id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subs)
    }

    /// Every persisted subscription joined with its feed URL, for the
    /// startup replay.
    pub async fn all_subscriptions(&self) -> Result<Vec<(Subscription, String)>> {
        let rows: Vec<(i64, i64, String, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT s.id, s.feed_id, s.handler_key, s.dispatch_uid, s.created_at, f.url
            FROM subscriptions s
            JOIN feeds f ON f.id = s.feed_id
            ORDER BY s.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, feed_id, handler_key, dispatch_uid, created_at, url)| {
                (
                    Subscription {
                        id,
                        feed_id,
                        handler_key,
                        dispatch_uid,
                        created_at,
                    },
                    url,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_reports_creation() {
        let db = Database::open(":memory:").await.unwrap();
        let feed = db.get_or_create_feed("https://example.com/feed").await.unwrap();

        let (first, created) = db
            .get_or_create_subscription(feed.id, "indexer", "uid-1", 1)
            .await
            .unwrap();
        assert!(created);

        let (second, created_again) = db
            .get_or_create_subscription(feed.id, "indexer", "uid-1", 2)
            .await
            .unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(db.subscriptions_for_feed(feed.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_handler_two_dispatch_uids_is_two_rows() {
        let db = Database::open(":memory:").await.unwrap();
        let feed = db.get_or_create_feed("https://example.com/feed").await.unwrap();

        db.get_or_create_subscription(feed.id, "indexer", "uid-1", 1).await.unwrap();
        db.get_or_create_subscription(feed.id, "indexer", "uid-2", 2).await.unwrap();

        assert_eq!(db.subscriptions_for_feed(feed.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_all_subscriptions_join() {
        let db = Database::open(":memory:").await.unwrap();
        let feed = db.get_or_create_feed("https://example.com/feed").await.unwrap();
        let (sub, _) = db
            .get_or_create_subscription(feed.id, "indexer", "uid-1", 1)
            .await
            .unwrap();

        let all = db.all_subscriptions().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, "https://example.com/feed");

        assert!(db.delete_subscription(sub.id).await.unwrap());
        assert!(!db.delete_subscription(sub.id).await.unwrap());
        assert!(db.all_subscriptions().await.unwrap().is_empty());
    }
}
