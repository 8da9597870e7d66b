//! Subscription cache.

use hubsync_protocol::{resolve_route, Collection};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps feed identifiers to cached collections.
///
/// Collections are held behind `Arc` and edited copy-on-write, so a reader
/// holding a collection never sees it change underneath it and never sees a
/// half-applied edit. Lookups resolve feed paths with the suffix rules in
/// [`hubsync_protocol::resolve_route`].
///
/// A feed present in the store always has a collection, possibly empty.
/// Absence means the feed was never subscribed.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    feeds: RwLock<HashMap<String, Arc<Collection>>>,
}

impl SubscriptionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key that `feed` resolves to.
    pub fn resolve(&self, feed: &str) -> Option<String> {
        let feeds = self.feeds.read();
        resolve_route(feeds.keys().map(String::as_str), feed).map(str::to_string)
    }

    /// Returns the cached collection for `feed`.
    pub fn get(&self, feed: &str) -> Option<Arc<Collection>> {
        let feeds = self.feeds.read();
        let key = resolve_route(feeds.keys().map(String::as_str), feed)?;
        feeds.get(key).cloned()
    }

    /// Returns true if `feed` resolves to a cached collection.
    pub fn contains(&self, feed: &str) -> bool {
        self.resolve(feed).is_some()
    }

    /// Replaces the collection stored under exactly `feed`.
    pub fn set(&self, feed: impl Into<String>, collection: Collection) -> Arc<Collection> {
        let collection = Arc::new(collection);
        self.feeds
            .write()
            .insert(feed.into(), Arc::clone(&collection));
        collection
    }

    /// Edits the collection `feed` resolves to under the write lock.
    ///
    /// Returns `None` without calling `edit` if nothing matches.
    pub fn mutate_in_place<F, R>(&self, feed: &str, edit: F) -> Option<R>
    where
        F: FnOnce(&mut Collection) -> R,
    {
        let mut feeds = self.feeds.write();
        let key = resolve_route(feeds.keys().map(String::as_str), feed)?.to_string();
        let collection = feeds.get_mut(&key)?;
        Some(edit(Arc::make_mut(collection)))
    }

    /// Removes the collection `feed` resolves to.
    pub fn remove(&self, feed: &str) -> Option<Arc<Collection>> {
        let mut feeds = self.feeds.write();
        let key = resolve_route(feeds.keys().map(String::as_str), feed)?.to_string();
        feeds.remove(&key)
    }

    /// Returns every stored feed key, sorted.
    pub fn feeds(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.feeds.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of cached feeds.
    pub fn len(&self) -> usize {
        self.feeds.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.feeds.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn absent_is_not_empty() {
        let store = SubscriptionStore::new();
        assert!(store.get("orders").is_none());

        store.set("orders", Vec::new());
        let cached = store.get("orders").unwrap();
        assert!(cached.is_empty());
        assert!(store.contains("orders"));
    }

    #[test]
    fn set_replaces_wholesale() {
        let store = SubscriptionStore::new();
        store.set("orders", vec![json!({"id": 1}), json!({"id": 2})]);
        store.set("orders", vec![json!({"id": 3})]);

        assert_eq!(*store.get("orders").unwrap(), vec![json!({"id": 3})]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookup_by_suffix() {
        let store = SubscriptionStore::new();
        store.set("orders", vec![json!({"id": 1})]);

        assert!(store.get("/api/v1/orders").is_some());
        assert_eq!(store.resolve("/api/v1/orders").as_deref(), Some("orders"));
        assert!(store.get("/api/v1/customers").is_none());
    }

    #[test]
    fn lookup_prefers_longest_suffix() {
        let store = SubscriptionStore::new();
        store.set("orders", vec![json!({"which": "short"})]);
        store.set("v1/orders", vec![json!({"which": "long"})]);

        let cached = store.get("/api/v1/orders").unwrap();
        assert_eq!(cached[0]["which"], "long");
    }

    #[test]
    fn mutate_missing_feed() {
        let store = SubscriptionStore::new();
        let called = store.mutate_in_place("orders", |c| c.push(json!({"id": 1})));
        assert!(called.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn mutate_does_not_disturb_held_snapshots() {
        let store = SubscriptionStore::new();
        store.set("orders", vec![json!({"id": 1})]);
        let before = store.get("orders").unwrap();

        store.mutate_in_place("orders", |c| c.push(json!({"id": 2})));

        assert_eq!(before.len(), 1);
        assert_eq!(store.get("orders").unwrap().len(), 2);
    }

    #[test]
    fn remove_resolves_route() {
        let store = SubscriptionStore::new();
        store.set("/api/orders", Vec::new());
        store.set("customers", Vec::new());

        assert!(store.remove("orders").is_some());
        assert_eq!(store.feeds(), vec!["customers".to_string()]);
    }

    #[test]
    fn readers_never_see_partial_edits() {
        let store = Arc::new(SubscriptionStore::new());
        store.set("pairs", Vec::new());

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500 {
                    store.mutate_in_place("pairs", |c| {
                        c.push(json!({"id": i, "half": 0}));
                        c.push(json!({"id": i, "half": 1}));
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.get("pairs").unwrap();
                        assert_eq!(snapshot.len() % 2, 0);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get("pairs").unwrap().len(), 1000);
    }
}
