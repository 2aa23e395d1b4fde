use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// A syndication feed, identified by its canonical URL.
///
/// `etag` holds the cache validator from the last 200-status fetch and is
/// sent back as `If-None-Match` on the next one. `enabled` gates scheduled
/// collection (`fetch-all`); disabled feeds are still fetchable directly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub etag: Option<String>,
    pub enabled: bool,
}

/// Audit row for one fetch attempt.
///
/// Created (with `timestamp_start`) before any network I/O so a crash
/// mid-fetch still leaves an attempt record; finalized once at the end of
/// the fetch. Timestamps are unix milliseconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FetchStatus {
    pub id: i64,
    pub feed_id: i64,
    pub http_status_code: Option<i64>,
    pub size_bytes: Option<i64>,
    pub timestamp_start: i64,
    pub timestamp_end: Option<i64>,
    pub nb_entries: Option<i64>,
    pub nb_new_entries: Option<i64>,
    pub error_msg: Option<String>,
}

/// The mutable tail of a [`FetchStatus`], written once when a fetch ends.
#[derive(Debug, Default, Clone)]
pub struct FetchStatusUpdate {
    pub http_status_code: Option<i64>,
    pub size_bytes: Option<i64>,
    pub timestamp_end: i64,
    pub nb_entries: Option<i64>,
    pub nb_new_entries: Option<i64>,
    pub error_msg: Option<String>,
}

/// One durably stored feed item. Append-only: rows are never updated, and
/// `(feed_id, uid_hash)` is the dedup key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub fetch_status_id: i64,
    /// Verbatim serialized XML of the entry element.
    pub xml: String,
    /// Content hash of the dialect-specific identifier, lowercase hex.
    pub uid_hash: String,
    pub created_at: i64,
}

/// A freshly persisted entry, handed to notification subscribers.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: i64,
    pub uid_hash: String,
    pub xml: String,
}

/// A durable callback registration.
///
/// `handler_key` is a stable string key into the process-local
/// [`crate::bus::HandlerRegistry`]; `dispatch_uid` distinguishes multiple
/// registrations on the same feed and is the uniqueness key both here and
/// in the live bus.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub feed_id: i64,
    pub handler_key: String,
    pub dispatch_uid: String,
    pub created_at: i64,
}
