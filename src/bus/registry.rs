use std::collections::HashMap;
use std::sync::Arc;

use super::Outcome;
use crate::storage::NewEntry;

/// A subscriber callback: invoked with the feed URL and the newly created
/// entries of one fetch. Must be callable from any thread.
pub type Handler = Arc<dyn Fn(&str, &[NewEntry]) -> Outcome + Send + Sync>;

/// Maps stable string keys to subscriber callbacks.
///
/// Durable subscription rows store only the key; the registry is populated
/// by explicit [`register`](Self::register) calls at process startup, which
/// is what makes persisted subscriptions resolvable after a restart. A key
/// that no startup code registers is the unresolvable-callback condition:
/// subscribing with it fails, and replaying a stored row with it is logged
/// and skipped.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback under a stable key. Re-registering a key
    /// replaces the previous callback; returns whether a callback was
    /// already present.
    pub fn register(&mut self, key: impl Into<String>, handler: Handler) -> bool {
        self.handlers.insert(key.into(), handler).is_some()
    }

    /// Resolve a key to its callback.
    pub fn resolve(&self, key: &str) -> Option<Handler> {
        self.handlers.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_resolve() {
        let mut registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let replaced = registry.register(
            "indexer",
            Arc::new(move |_url, _entries| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        assert!(!replaced);
        assert!(registry.contains("indexer"));

        let handler = registry.resolve("indexer").unwrap();
        handler("https://example.com/feed", &[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_key_is_unresolvable() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("missing").is_none());
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register("indexer", Arc::new(|_, _| Ok(())));
        let replaced = registry.register("indexer", Arc::new(|_, _| Ok(())));
        assert!(replaced);
    }
}
