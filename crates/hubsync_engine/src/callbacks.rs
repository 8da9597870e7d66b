//! Change observers.

use crate::store::SubscriptionStore;
use hubsync_protocol::{route_matches, ChangeEnvelope, Collection};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// Observer for one feed. Receives the feed's current collection.
pub type DataCallback = Arc<dyn Fn(Arc<Collection>) + Send + Sync>;

/// Observer for every decoded envelope, before reconciliation.
pub type EnvelopeCallback = Arc<dyn Fn(&ChangeEnvelope) + Send + Sync>;

/// How cached collections are handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Share the cached collection. No copy is made; the caller sees the
    /// snapshot the cache held at delivery time.
    Shared,
    /// Give each caller its own copy, free to be mutated.
    DeepCopy,
}

impl DeliveryMode {
    /// Selects the mode from the deep-copy configuration flag.
    pub fn from_deep_copy(deep_copy: bool) -> Self {
        if deep_copy {
            DeliveryMode::DeepCopy
        } else {
            DeliveryMode::Shared
        }
    }

    /// Prepares a cached collection for delivery.
    pub fn deliver(&self, collection: &Arc<Collection>) -> Arc<Collection> {
        match self {
            DeliveryMode::Shared => Arc::clone(collection),
            DeliveryMode::DeepCopy => Arc::new(collection.as_ref().clone()),
        }
    }
}

/// Registered callbacks for one pattern.
struct PatternEntry {
    pattern: String,
    callbacks: Vec<DataCallback>,
}

/// Maps feed patterns to observers and dispatches change notifications.
///
/// Patterns are matched against changed feeds with the same suffix rule the
/// store uses. Dispatch visits patterns in the order they were first
/// registered and callbacks in registration order within a pattern.
/// Callbacks are compared by `Arc` identity.
pub struct CallbackRegistry {
    entries: RwLock<Vec<PatternEntry>>,
    envelope_callbacks: RwLock<Vec<EnvelopeCallback>>,
    mode: DeliveryMode,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            envelope_callbacks: RwLock::new(Vec::new()),
            mode,
        }
    }

    /// Returns the delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Registers a callback for a pattern.
    ///
    /// Returns false if this callback was already registered for it.
    pub fn register(&self, pattern: impl Into<String>, callback: DataCallback) -> bool {
        let pattern = pattern.into();
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.pattern == pattern) {
            Some(entry) => {
                if entry.callbacks.iter().any(|c| same_callback(c, &callback)) {
                    return false;
                }
                entry.callbacks.push(callback);
            }
            None => entries.push(PatternEntry {
                pattern,
                callbacks: vec![callback],
            }),
        }
        true
    }

    /// Unregisters a callback from a pattern.
    ///
    /// Returns false if it was not registered.
    pub fn unregister(&self, pattern: &str, callback: &DataCallback) -> bool {
        let mut entries = self.entries.write();
        let Some(index) = entries.iter().position(|e| e.pattern == pattern) else {
            return false;
        };
        let entry = &mut entries[index];
        let before = entry.callbacks.len();
        entry.callbacks.retain(|c| !same_callback(c, callback));
        let removed = entry.callbacks.len() != before;
        if entry.callbacks.is_empty() {
            entries.remove(index);
        }
        removed
    }

    /// Registers an envelope observer. Returns false if already registered.
    pub fn register_envelope(&self, callback: EnvelopeCallback) -> bool {
        let mut callbacks = self.envelope_callbacks.write();
        if callbacks.iter().any(|c| same_envelope_callback(c, &callback)) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Unregisters an envelope observer. Returns false if not registered.
    pub fn unregister_envelope(&self, callback: &EnvelopeCallback) -> bool {
        let mut callbacks = self.envelope_callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|c| !same_envelope_callback(c, callback));
        callbacks.len() != before
    }

    /// Returns every callback whose pattern matches `feed`, in dispatch order.
    pub fn callbacks_for(&self, feed: &str) -> Vec<DataCallback> {
        self.entries
            .read()
            .iter()
            .filter(|e| route_matches(&e.pattern, feed))
            .flat_map(|e| e.callbacks.iter().cloned())
            .collect()
    }

    /// Returns the number of registered feed callbacks.
    pub fn len(&self) -> usize {
        self.entries.read().iter().map(|e| e.callbacks.len()).sum()
    }

    /// Returns true if no feed callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Hands `envelope` to every envelope observer.
    pub fn notify_envelope(&self, envelope: &ChangeEnvelope) {
        let callbacks = self.envelope_callbacks.read().clone();
        for callback in callbacks {
            callback(envelope);
        }
    }

    /// Invokes the callbacks of each changed feed with its cached collection.
    ///
    /// `changed` must already be deduplicated. Feeds without a cached
    /// collection are skipped. Returns the number of callback invocations.
    pub fn dispatch(&self, store: &SubscriptionStore, changed: &[String]) -> usize {
        let mut invoked = 0;
        for feed in changed {
            let Some(collection) = store.get(feed) else {
                trace!(feed = %feed, "no cached collection to deliver");
                continue;
            };
            // Locks are released before user code runs.
            for callback in self.callbacks_for(feed) {
                callback(self.mode.deliver(&collection));
                invoked += 1;
            }
        }
        invoked
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new(DeliveryMode::Shared)
    }
}

fn same_callback(a: &DataCallback, b: &DataCallback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn same_envelope_callback(a: &EnvelopeCallback, b: &EnvelopeCallback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> DataCallback {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Arc::new(move |collection: Arc<Collection>| {
            log.lock().push(format!("{tag}:{}", collection.len()));
        })
    }

    #[test]
    fn register_is_idempotent() {
        let registry = CallbackRegistry::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cb = recorder(&log, "a");

        assert!(registry.register("orders", Arc::clone(&cb)));
        assert!(!registry.register("orders", Arc::clone(&cb)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = CallbackRegistry::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cb = recorder(&log, "a");

        assert!(!registry.unregister("orders", &cb));
        registry.register("orders", Arc::clone(&cb));
        assert!(registry.unregister("orders", &cb));
        assert!(!registry.unregister("orders", &cb));
        assert!(registry.is_empty());
    }

    #[test]
    fn dispatch_in_registration_order() {
        let registry = CallbackRegistry::default();
        let store = SubscriptionStore::new();
        store.set("orders", vec![json!({"id": 1})]);

        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("orders", recorder(&log, "first"));
        registry.register("/api/orders", recorder(&log, "second"));
        registry.register("orders", recorder(&log, "third"));
        registry.register("customers", recorder(&log, "other"));

        let invoked = registry.dispatch(&store, &["/api/orders".to_string()]);

        assert_eq!(invoked, 3);
        assert_eq!(*log.lock(), vec!["first:1", "third:1", "second:1"]);
    }

    #[test]
    fn dispatch_skips_uncached_feeds() {
        let registry = CallbackRegistry::default();
        let store = SubscriptionStore::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("orders", recorder(&log, "a"));

        assert_eq!(registry.dispatch(&store, &["orders".to_string()]), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn shared_delivery_reuses_cache_snapshot() {
        let cached = Arc::new(vec![json!({"id": 1})]);
        let delivered = DeliveryMode::Shared.deliver(&cached);
        assert!(Arc::ptr_eq(&cached, &delivered));
    }

    #[test]
    fn deep_copy_delivery_is_independent() {
        let store = SubscriptionStore::new();
        store.set("orders", vec![json!({"id": 1})]);
        let registry = CallbackRegistry::new(DeliveryMode::DeepCopy);

        registry.register(
            "orders",
            Arc::new(|mut collection: Arc<Collection>| {
                Arc::make_mut(&mut collection).push(json!({"id": 2}));
                assert_eq!(collection.len(), 2);
            }),
        );
        registry.dispatch(&store, &["orders".to_string()]);

        assert_eq!(*store.get("orders").unwrap(), vec![json!({"id": 1})]);
        let cached = store.get("orders").unwrap();
        assert!(!Arc::ptr_eq(&cached, &DeliveryMode::DeepCopy.deliver(&cached)));
    }

    #[test]
    fn envelope_observers() {
        let registry = CallbackRegistry::default();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let cb: EnvelopeCallback = Arc::new(move |envelope: &ChangeEnvelope| {
            *sink.lock() += envelope.len();
        });

        assert!(registry.register_envelope(Arc::clone(&cb)));
        assert!(!registry.register_envelope(Arc::clone(&cb)));
        registry.notify_envelope(&ChangeEnvelope::new(vec![
            hubsync_protocol::UrlChangeSet::new("a"),
            hubsync_protocol::UrlChangeSet::new("b"),
        ]));
        assert_eq!(*seen.lock(), 2);

        assert!(registry.unregister_envelope(&cb));
        registry.notify_envelope(&ChangeEnvelope::default());
        assert_eq!(*seen.lock(), 2);
    }
}
