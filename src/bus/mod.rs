//! In-process notification fan-out.
//!
//! [`HandlerRegistry`] maps stable string keys to subscriber callbacks and
//! is populated by explicit registration at startup — a durable
//! subscription row stores the key, never the callback itself.
//!
//! [`NotificationBus`] is the live per-feed registry of connected
//! callbacks, rebuilt from storage on startup and mutated by
//! subscribe/unsubscribe. It holds no ownership over subscription rows.

mod registry;

pub use registry::{Handler, HandlerRegistry};

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use thiserror::Error;

use crate::storage::NewEntry;

/// A subscriber callback failure, as reported per receiver by
/// [`NotificationBus::send`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// Per-receiver delivery result.
pub type Outcome = Result<(), HandlerError>;

struct Registration {
    dispatch_uid: String,
    handler: Handler,
}

/// Process-wide registry of live subscriber callbacks, one dispatch point
/// per feed.
///
/// A single coarse lock guards the whole map — registration and
/// notification are not hot paths, and one lock keeps the invariants easy
/// to reason about. The lock is only ever held for map mutation or lookup;
/// [`send`](Self::send) copies the registration list and invokes callbacks
/// after releasing it, so a callback may re-enter `connect`/`disconnect`
/// without deadlocking.
#[derive(Default)]
pub struct NotificationBus {
    inner: Mutex<HashMap<i64, Vec<Registration>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a feed.
    ///
    /// The feed's dispatch point is created lazily. Registration is
    /// idempotent on `dispatch_uid`: a second connect with the same uid is
    /// a no-op, preventing duplicate delivery to the same logical
    /// subscriber. Returns whether a new registration was added.
    pub fn connect(&self, feed_id: i64, dispatch_uid: &str, handler: Handler) -> bool {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        let registrations = inner.entry(feed_id).or_default();

        if registrations.iter().any(|r| r.dispatch_uid == dispatch_uid) {
            return false;
        }

        registrations.push(Registration {
            dispatch_uid: dispatch_uid.to_string(),
            handler,
        });
        true
    }

    /// Remove the registration matching `dispatch_uid`, if present.
    /// Returns whether something was removed.
    pub fn disconnect(&self, feed_id: i64, dispatch_uid: &str) -> bool {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        match inner.get_mut(&feed_id) {
            Some(registrations) => {
                let before = registrations.len();
                registrations.retain(|r| r.dispatch_uid != dispatch_uid);
                registrations.len() < before
            }
            None => false,
        }
    }

    /// Deliver new entries to every callback registered for a feed.
    ///
    /// Callbacks run synchronously in registration order. Each failure —
    /// an `Err` return or a panic — is captured as that receiver's outcome
    /// and never affects delivery to the remaining receivers. A feed with
    /// no dispatch point yields an empty vec: no receivers, not an error.
    pub fn send(&self, feed_id: i64, feed_url: &str, new_entries: &[NewEntry]) -> Vec<(String, Outcome)> {
        // Copy out the registrations so callbacks run outside the lock; the
        // snapshot also keeps the delivery list stable mid-dispatch.
        let snapshot: Vec<(String, Handler)> = {
            let inner = self.inner.lock().expect("bus lock poisoned");
            match inner.get(&feed_id) {
                Some(registrations) => registrations
                    .iter()
                    .map(|r| (r.dispatch_uid.clone(), r.handler.clone()))
                    .collect(),
                None => return Vec::new(),
            }
        };

        snapshot
            .into_iter()
            .map(|(dispatch_uid, handler)| {
                let outcome = match catch_unwind(AssertUnwindSafe(|| handler(feed_url, new_entries))) {
                    Ok(result) => result,
                    Err(panic) => Err(HandlerError(format!(
                        "receiver panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                };
                (dispatch_uid, outcome)
            })
            .collect()
    }

    /// Number of live registrations for a feed.
    pub fn registration_count(&self, feed_id: i64) -> usize {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner.get(&feed_id).map_or(0, |r| r.len())
    }

    /// Total number of live registrations across all feeds.
    pub fn total_registrations(&self) -> usize {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner.values().map(|r| r.len()).sum()
    }

    /// Drop every registration. Test isolation hook.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.clear();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
