use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use super::client;
use super::diag::Diagnostics;
use super::ingest::ingest;
use super::parser::parse_entries;
use crate::archive::ArchiveStore;
use crate::hub::Hub;
use crate::storage::{Feed, FetchStatusUpdate};

impl Hub {
    /// Run the full pipeline for one feed: status row, conditional fetch,
    /// parse, dedup + persist, notify, finalize.
    ///
    /// Everything that can go wrong mid-fetch (transport error, unexpected
    /// status, unparseable document, unidentifiable or unstorable entries)
    /// is absorbed into the diagnostic buffer and ends up in the status
    /// row's `error_msg`; receiver failures are logged per receiver by
    /// [`Hub::notify`] and never affect the fetch result. Only storage
    /// failures on the status row itself propagate, to be caught by
    /// [`fetch_collection`](Self::fetch_collection).
    ///
    /// Returns whether the fetch finished without diagnostics.
    pub async fn fetch_one(&self, feed: &Feed) -> Result<bool> {
        let start = Utc::now();
        // Persisted before any network I/O: a crash mid-fetch must still
        // leave an addressable attempt record. Start times are unique per
        // feed; a fetch landing in the same millisecond as the previous one
        // is nudged forward.
        let mut start_millis = start.timestamp_millis();
        let status_id = loop {
            match self.db().create_fetch_status(feed.id, start_millis).await {
                Ok(id) => break id,
                Err(e) if start_millis < start.timestamp_millis() + 3 => {
                    tracing::debug!(feed = %feed.url, error = %e, "Start timestamp taken, nudging");
                    start_millis += 1;
                }
                Err(e) => return Err(e),
            }
        };
        // The persisted anchor is authoritative; the archive name below is
        // derived from it, so a nudge must carry through.
        let start = DateTime::from_timestamp_millis(start_millis).unwrap_or(start);

        let mut diag = Diagnostics::new();
        let mut update = FetchStatusUpdate::default();

        let content = match client::fetch(
            self.client(),
            &feed.url,
            feed.etag.as_deref(),
            self.config().use_http_compression,
            self.config().request_timeout(),
        )
        .await
        {
            Ok(content) => Some(content),
            Err(e) => {
                diag.push(format!("Error while getting the content.\n{}", e));
                None
            }
        };

        if let Some(content) = &content {
            update.http_status_code = Some(i64::from(content.status));
            match content.status {
                // Not modified: nothing to parse, stored etag untouched.
                304 => {}
                200 => {
                    update.size_bytes = Some(content.body.len() as i64);

                    match parse_entries(&content.body) {
                        Err(e) => diag.push(format!("Feed cannot be parsed.\n{}", e)),
                        Ok(entries) if entries.is_empty() => diag.push("No entries found."),
                        Ok(entries) => {
                            update.nb_entries = Some(entries.len() as i64);
                            let new_entries =
                                ingest(self.db(), feed.id, status_id, &entries, &mut diag).await?;
                            update.nb_new_entries = Some(new_entries.len() as i64);
                            if !new_entries.is_empty() {
                                self.notify(feed, &new_entries);
                            }
                        }
                    }

                    if let Some(etag) = &content.etag {
                        self.db().set_feed_etag(feed.id, etag).await?;
                    }
                }
                other => diag.push(format!("HTTP status code = {} != 200 or 304.", other)),
            }
        }

        let end = Utc::now();
        update.timestamp_end = end.timestamp_millis();

        let error_msg = diag.flush();
        if error_msg.is_empty() {
            if update.http_status_code == Some(304) {
                tracing::info!(feed = %feed.url, "Fetching => 304 Feed not modified");
            } else {
                tracing::info!(
                    feed = %feed.url,
                    size_bytes = update.size_bytes.unwrap_or(0),
                    elapsed_secs = (end - start).num_milliseconds() as f64 / 1000.0,
                    nb_new_entries = update.nb_new_entries.unwrap_or(0),
                    nb_entries = update.nb_entries.unwrap_or(0),
                    "Fetching => [OK]"
                );
            }
        } else {
            // Keep the raw payload for post-mortem, and record how that went.
            let mut final_msg = error_msg;
            if let Some(content) = &content {
                if !content.body.is_empty() {
                    let name = ArchiveStore::archive_name(&feed.url, start);
                    final_msg.push('\n');
                    final_msg.push_str(&self.archive().outcome(&name, &content.body));
                }
            }
            tracing::error!(feed = %feed.url, error = %final_msg, "Fetching => [KO]");
            update.error_msg = Some(final_msg);
        }

        let succeeded = update.error_msg.is_none();
        // Final write carries everything, including the flushed diagnostics.
        self.db().finalize_fetch_status(status_id, &update).await?;
        Ok(succeeded)
    }

    /// Fetch a collection of feeds sequentially. One feed's failure never
    /// stops the rest. Returns the elapsed wall time.
    pub async fn fetch_collection(&self, feeds: &[Feed], label: &str) -> Duration {
        let started = Instant::now();
        tracing::info!(label = label, nb_feeds = feeds.len(), "Fetching feeds => start");

        for feed in feeds {
            if let Err(e) = self.fetch_one(feed).await {
                tracing::error!(feed = %feed.url, error = %e, "Fetching => [KO]");
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            label = label,
            nb_feeds = feeds.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Fetching feeds => end"
        );
        elapsed
    }
}
