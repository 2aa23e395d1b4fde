//! End-to-end fetch pipeline tests against a mock HTTP server: entry
//! creation and dedup across fetches, notification content, conditional
//! requests and the stored etag.

use std::sync::{Arc, Mutex};

use feedhub::archive::ArchiveStore;
use feedhub::bus::HandlerRegistry;
use feedhub::config::Config;
use feedhub::hub::Hub;
use feedhub::storage::{Database, NewEntry};
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSS_TWO_ITEMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <item><guid>a</guid><title>First</title></item>
    <item><guid>b</guid><title>Second</title></item>
  </channel>
</rss>"#;

/// Entries delivered to the capturing handler: (feed_url, entry xml).
type Captured = Arc<Mutex<Vec<(String, Vec<String>)>>>;

fn capturing_registry(captured: &Captured) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    let sink = captured.clone();
    registry.register(
        "collector",
        Arc::new(move |feed_url: &str, entries: &[NewEntry]| {
            sink.lock().unwrap().push((
                feed_url.to_string(),
                entries.iter().map(|e| e.xml.clone()).collect(),
            ));
            Ok(())
        }),
    );
    registry
}

async fn test_hub(archive_root: &std::path::Path, captured: &Captured) -> Hub {
    let db = Database::open(":memory:").await.unwrap();
    Hub::new(
        db,
        capturing_registry(captured),
        ArchiveStore::new(archive_root),
        reqwest::Client::new(),
        Config::default(),
    )
}

#[tokio::test]
async fn test_first_fetch_stores_entries_and_notifies_once() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .set_body_string(RSS_TWO_ITEMS),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let hub = test_hub(dir.path(), &captured).await;

    let feed_url = format!("{}/feed", mock_server.uri());
    assert!(hub.subscribe(&feed_url, "collector", None).await);
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();

    let ok = hub.fetch_one(&feed).await.unwrap();
    assert!(ok);

    // Status row: both counters filled, no diagnostics.
    let statuses = hub.db().statuses_for_feed(feed.id).await.unwrap();
    assert_eq!(statuses.len(), 1);
    let status = &statuses[0];
    assert_eq!(status.http_status_code, Some(200));
    assert_eq!(status.size_bytes, Some(RSS_TWO_ITEMS.len() as i64));
    assert_eq!(status.nb_entries, Some(2));
    assert_eq!(status.nb_new_entries, Some(2));
    assert_eq!(status.error_msg, None);
    assert!(status.timestamp_end.is_some());

    // Entries persisted verbatim, distinct hashes.
    let entries = hub.db().entries_for_feed(feed.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].uid_hash, entries[1].uid_hash);
    assert!(entries[0].xml.contains("<guid>a</guid>"));
    assert!(entries[1].xml.contains("<guid>b</guid>"));

    // One notification carrying both new entries.
    let notifications = captured.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    let (notified_url, xmls) = &notifications[0];
    assert_eq!(notified_url, &feed_url);
    assert_eq!(xmls.len(), 2);

    // The response etag is now stored on the feed.
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();
    assert_eq!(feed.etag.as_deref(), Some("\"v1\""));
}

#[tokio::test]
async fn test_refetch_of_identical_content_creates_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v2\"")
                .set_body_string(RSS_TWO_ITEMS),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let hub = test_hub(dir.path(), &captured).await;

    let feed_url = format!("{}/feed", mock_server.uri());
    assert!(hub.subscribe(&feed_url, "collector", None).await);
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();

    assert!(hub.fetch_one(&feed).await.unwrap());
    // Reload: the first fetch updated the stored etag.
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();
    assert!(hub.fetch_one(&feed).await.unwrap());

    let statuses = hub.db().statuses_for_feed(feed.id).await.unwrap();
    assert_eq!(statuses.len(), 2);
    let second = &statuses[1];
    assert_eq!(second.nb_entries, Some(2));
    assert_eq!(second.nb_new_entries, Some(0));
    assert_eq!(second.error_msg, None);

    assert_eq!(hub.db().entries_for_feed(feed.id).await.unwrap().len(), 2);
    // No new entries, no second notification.
    assert_eq!(captured.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_not_modified_short_circuits_and_keeps_etag() {
    let mock_server = MockServer::start().await;
    // Conditional requests are answered 304; the first, unconditional one
    // falls through to the 200 mock below.
    Mock::given(method("GET"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .set_body_string(RSS_TWO_ITEMS),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let hub = test_hub(dir.path(), &captured).await;

    let feed_url = format!("{}/feed", mock_server.uri());
    assert!(hub.subscribe(&feed_url, "collector", None).await);
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();

    assert!(hub.fetch_one(&feed).await.unwrap());
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();
    assert_eq!(feed.etag.as_deref(), Some("\"v1\""));

    assert!(hub.fetch_one(&feed).await.unwrap());

    let statuses = hub.db().statuses_for_feed(feed.id).await.unwrap();
    assert_eq!(statuses.len(), 2);
    let second = &statuses[1];
    assert_eq!(second.http_status_code, Some(304));
    // Nothing downloaded, nothing parsed.
    assert_eq!(second.size_bytes, None);
    assert_eq!(second.nb_entries, None);
    assert_eq!(second.nb_new_entries, None);
    assert_eq!(second.error_msg, None);

    // Etag untouched, no new notification.
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();
    assert_eq!(feed.etag.as_deref(), Some("\"v1\""));
    assert_eq!(captured.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_grown_feed_notifies_only_the_new_entry() {
    let mock_server = MockServer::start().await;
    let hub_dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let hub = test_hub(hub_dir.path(), &captured).await;

    let feed_url = format!("{}/feed", mock_server.uri());
    assert!(hub.subscribe(&feed_url, "collector", None).await);
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();

    let first = Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS_TWO_ITEMS))
        .expect(1)
        .mount_as_scoped(&mock_server)
        .await;
    assert!(hub.fetch_one(&feed).await.unwrap());
    drop(first);

    let grown = RSS_TWO_ITEMS.replace(
        "</channel>",
        "<item><guid>c</guid><title>Third</title></item></channel>",
    );
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(grown))
        .mount(&mock_server)
        .await;
    assert!(hub.fetch_one(&feed).await.unwrap());

    let statuses = hub.db().statuses_for_feed(feed.id).await.unwrap();
    let second = &statuses[1];
    assert_eq!(second.nb_entries, Some(3));
    assert_eq!(second.nb_new_entries, Some(1));

    let notifications = captured.lock().unwrap();
    assert_eq!(notifications.len(), 2);
    let (_, second_batch) = &notifications[1];
    assert_eq!(second_batch.len(), 1);
    assert!(second_batch[0].contains("<guid>c</guid>"));
}

#[tokio::test]
async fn test_entries_without_id_are_reported_not_stored() {
    let body = r#"<rss version="2.0"><channel>
        <item><guid>a</guid></item>
        <item><title>No guid here</title></item>
    </channel></rss>"#;

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let hub = test_hub(dir.path(), &captured).await;

    let feed_url = format!("{}/feed", mock_server.uri());
    let feed = hub.db().get_or_create_feed(&feed_url).await.unwrap();

    let ok = hub.fetch_one(&feed).await.unwrap();
    assert!(!ok);

    let status = &hub.db().statuses_for_feed(feed.id).await.unwrap()[0];
    assert_eq!(status.nb_entries, Some(2));
    assert_eq!(status.nb_new_entries, Some(1));
    let msg = status.error_msg.as_deref().unwrap();
    assert!(msg.contains("Entry #1: no ID can be found."), "got: {msg}");

    assert_eq!(hub.db().entries_for_feed(feed.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_document_leaves_diagnostic_and_archive() {
    let body = r#"<rss version="2.0"><channel><title>Nothing</title></channel></rss>"#;

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let hub = test_hub(dir.path(), &captured).await;

    let feed_url = format!("{}/feed", mock_server.uri());
    let feed = hub.db().get_or_create_feed(&feed_url).await.unwrap();

    let ok = hub.fetch_one(&feed).await.unwrap();
    assert!(!ok);

    let status = &hub.db().statuses_for_feed(feed.id).await.unwrap()[0];
    let msg = status.error_msg.as_deref().unwrap();
    assert!(msg.contains("No entries found."), "got: {msg}");
    assert!(msg.contains("Storage attempt: file saved"), "got: {msg}");
    assert!(captured.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_atom_feed_goes_through_the_same_pipeline() {
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <entry><id>urn:a</id><title>First</title></entry>
  <entry><id>urn:b</id><title>Second</title></entry>
</feed>"#;

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let hub = test_hub(dir.path(), &captured).await;

    let feed_url = format!("{}/feed", mock_server.uri());
    assert!(hub.subscribe(&feed_url, "collector", None).await);
    let feed = hub.db().feed_by_url(&feed_url).await.unwrap().unwrap();

    assert!(hub.fetch_one(&feed).await.unwrap());

    let entries = hub.db().entries_for_feed(feed.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].xml.contains("<id>urn:a</id>"));
    assert_eq!(captured.lock().unwrap().len(), 1);
}
