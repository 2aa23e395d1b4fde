//! The hub ties the pieces together: durable subscriptions, the live
//! notification bus, and the fetch pipeline (see `fetch::pipeline` for the
//! fetch half of the impl).
//!
//! All collaborators are injected once at startup and owned here — there is
//! no lazily initialized global state. Call [`Hub::load_subscriptions`]
//! after construction to replay persisted subscriptions into the bus before
//! accepting fetch or notify operations.

use chrono::Utc;

use crate::archive::ArchiveStore;
use crate::bus::{HandlerRegistry, NotificationBus, Outcome};
use crate::config::Config;
use crate::storage::{Database, Feed, NewEntry};
use crate::util::{content_hash, validate_feed_url};

pub struct Hub {
    db: Database,
    bus: NotificationBus,
    registry: HandlerRegistry,
    archive: ArchiveStore,
    client: reqwest::Client,
    config: Config,
}

impl Hub {
    pub fn new(
        db: Database,
        registry: HandlerRegistry,
        archive: ArchiveStore,
        client: reqwest::Client,
        config: Config,
    ) -> Self {
        Self {
            db,
            bus: NotificationBus::new(),
            registry,
            archive,
            client,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub(crate) fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The dispatch uid actually used for a registration: the caller's, or
    /// one derived from the handler key.
    fn effective_dispatch_uid(handler_key: &str, dispatch_uid: Option<&str>) -> String {
        match dispatch_uid {
            Some(uid) => uid.to_string(),
            None => content_hash(handler_key),
        }
    }

    /// Subscribe a registered handler to a feed. The subscription is
    /// persisted and loaded into the bus right away.
    ///
    /// `handler_key` must name a handler registered in the
    /// [`HandlerRegistry`] at startup; an unknown key fails. When
    /// `dispatch_uid` is not supplied it is derived from the handler key.
    ///
    /// Idempotent: repeating a subscribe with the same feed, key and uid
    /// leaves one row and one live registration. Returns false and logs on
    /// any failure; never propagates past this boundary.
    pub async fn subscribe(
        &self,
        feed_url: &str,
        handler_key: &str,
        dispatch_uid: Option<&str>,
    ) -> bool {
        if let Err(e) = validate_feed_url(feed_url) {
            tracing::error!(feed = %feed_url, error = %e, "Subscribing => invalid feed URL [KO]");
            return false;
        }

        let handler = match self.registry.resolve(handler_key) {
            Some(handler) => handler,
            None => {
                tracing::error!(
                    feed = %feed_url,
                    handler_key = handler_key,
                    "Subscribing => handler key cannot be resolved [KO]"
                );
                return false;
            }
        };

        let uid = Self::effective_dispatch_uid(handler_key, dispatch_uid);

        let feed = match self.db.get_or_create_feed(feed_url).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::error!(feed = %feed_url, error = %e, "Subscribing => cannot get or create the feed [KO]");
                return false;
            }
        };

        let created_at = Utc::now().timestamp_millis();
        match self
            .db
            .get_or_create_subscription(feed.id, handler_key, &uid, created_at)
            .await
        {
            Ok((sub, created)) => {
                if created {
                    tracing::info!(
                        feed = %feed_url,
                        handler_key = handler_key,
                        dispatch_uid = %sub.dispatch_uid,
                        "Subscribing => subscription created"
                    );
                }
                // Load even when the row already existed; connect is
                // idempotent on the dispatch uid.
                self.bus.connect(feed.id, &uid, handler);
                tracing::info!(feed = %feed_url, dispatch_uid = %uid, "Subscription - Loading => [OK]");
                true
            }
            Err(e) => {
                tracing::error!(
                    feed = %feed_url,
                    handler_key = handler_key,
                    dispatch_uid = %uid,
                    error = %e,
                    "Subscribing => cannot get or create the subscription [KO]"
                );
                false
            }
        }
    }

    /// Remove a subscription: unload it from the bus, then delete the row.
    ///
    /// A subscription that does not exist is treated as success — already
    /// unsubscribed is not an error.
    pub async fn unsubscribe(
        &self,
        feed_url: &str,
        handler_key: &str,
        dispatch_uid: Option<&str>,
    ) -> bool {
        let uid = Self::effective_dispatch_uid(handler_key, dispatch_uid);

        let feed = match self.db.feed_by_url(feed_url).await {
            Ok(Some(feed)) => feed,
            Ok(None) => return true,
            Err(e) => {
                tracing::error!(feed = %feed_url, error = %e, "Unsubscribing => cannot look up the feed [KO]");
                return false;
            }
        };

        let sub = match self.db.find_subscription(feed.id, &uid).await {
            Ok(Some(sub)) => sub,
            Ok(None) => return true,
            Err(e) => {
                tracing::error!(feed = %feed_url, dispatch_uid = %uid, error = %e, "Unsubscribing => lookup failed [KO]");
                return false;
            }
        };

        self.remove_subscription(feed.id, &feed.url, &sub.dispatch_uid, sub.id)
            .await
    }

    /// Remove every subscription of a feed. Bulk counterpart of
    /// [`unsubscribe`](Self::unsubscribe); each row is unloaded from the
    /// bus before its delete.
    pub async fn unsubscribe_all(&self, feed_url: &str) -> bool {
        let feed = match self.db.feed_by_url(feed_url).await {
            Ok(Some(feed)) => feed,
            Ok(None) => return true,
            Err(e) => {
                tracing::error!(feed = %feed_url, error = %e, "Unsubscribing all => cannot look up the feed [KO]");
                return false;
            }
        };

        let subs = match self.db.subscriptions_for_feed(feed.id).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(feed = %feed_url, error = %e, "Unsubscribing all => lookup failed [KO]");
                return false;
            }
        };

        let mut all_ok = true;
        for sub in subs {
            if !self
                .remove_subscription(feed.id, &feed.url, &sub.dispatch_uid, sub.id)
                .await
            {
                all_ok = false;
            }
        }
        all_ok
    }

    /// Unload-then-delete for one subscription row. Unloading first is an
    /// invariant: otherwise the bus would retain a registration referencing
    /// a deleted row.
    async fn remove_subscription(
        &self,
        feed_id: i64,
        feed_url: &str,
        dispatch_uid: &str,
        subscription_id: i64,
    ) -> bool {
        self.bus.disconnect(feed_id, dispatch_uid);
        tracing::info!(feed = %feed_url, dispatch_uid = %dispatch_uid, "Subscription - Unloading => [OK]");

        match self.db.delete_subscription(subscription_id).await {
            Ok(_) => {
                tracing::info!(feed = %feed_url, dispatch_uid = %dispatch_uid, "Subscription deleted");
                true
            }
            Err(e) => {
                tracing::error!(
                    feed = %feed_url,
                    dispatch_uid = %dispatch_uid,
                    error = %e,
                    "Subscription cannot be deleted [KO]"
                );
                false
            }
        }
    }

    /// Replay every persisted subscription into the bus. Called once at
    /// process start, before fetch or notify operations.
    ///
    /// A storage failure (e.g. schema not created yet on a first run) is
    /// logged and startup continues. Rows whose handler key is not
    /// registered in this process are logged and skipped. Returns the
    /// number of registrations loaded.
    pub async fn load_subscriptions(&self) -> usize {
        tracing::info!("[Subscriptions] - Loading existing subscriptions => init");

        let rows = match self.db.all_subscriptions().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "[Subscriptions] - Loading existing subscriptions => failed [KO]");
                return 0;
            }
        };

        let mut loaded = 0;
        for (sub, feed_url) in rows {
            match self.registry.resolve(&sub.handler_key) {
                Some(handler) => {
                    if self.bus.connect(sub.feed_id, &sub.dispatch_uid, handler) {
                        loaded += 1;
                    }
                    tracing::info!(feed = %feed_url, dispatch_uid = %sub.dispatch_uid, "Subscription - Loading => [OK]");
                }
                None => {
                    tracing::error!(
                        feed = %feed_url,
                        handler_key = %sub.handler_key,
                        "Subscription - Loading => handler key cannot be resolved [KO]"
                    );
                }
            }
        }

        tracing::info!(loaded = loaded, "[Subscriptions] - Loading existing subscriptions => ready");
        loaded
    }

    /// Notify all subscribers of a feed about newly created entries and log
    /// each receiver's outcome. Failures are per receiver; they never
    /// affect sibling subscribers or the fetch result.
    pub fn notify(&self, feed: &Feed, new_entries: &[NewEntry]) -> Vec<(String, Outcome)> {
        let outcomes = self.bus.send(feed.id, &feed.url, new_entries);

        if outcomes.is_empty() {
            tracing::info!(feed = %feed.url, "New entries - No receivers to notify");
            return outcomes;
        }

        for (dispatch_uid, outcome) in &outcomes {
            match outcome {
                Ok(()) => {
                    tracing::info!(feed = %feed.url, receiver = %dispatch_uid, "Notifying receiver => [OK]");
                }
                Err(e) => {
                    tracing::error!(feed = %feed.url, receiver = %dispatch_uid, error = %e, "Notifying receiver => [KO]");
                }
            }
        }
        outcomes
    }
}
