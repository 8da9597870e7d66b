//! Change reconciliation.
//!
//! Applies change envelopes to cached collections. Records are matched by
//! dual-key identity: two records are the same entity if their primary
//! identifier fields are equal, or if their alternate identifier fields are
//! equal. A field only takes part in matching when it is present and not
//! `null` on both records.

use crate::store::SubscriptionStore;
use hubsync_protocol::{ChangeEnvelope, Collection, EntityChange, Record};
use serde_json::Value;
use tracing::debug;

/// Identifier field names used to match records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIdentity {
    primary: String,
    alternate: String,
}

impl RecordIdentity {
    /// Creates an identity from the primary and alternate field names.
    pub fn new(primary: impl Into<String>, alternate: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            alternate: alternate.into(),
        }
    }

    /// Returns the primary field name.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Returns the alternate field name.
    pub fn alternate(&self) -> &str {
        &self.alternate
    }

    /// Returns true if `a` and `b` identify the same entity.
    pub fn matches(&self, a: &Record, b: &Record) -> bool {
        same_field(a, b, &self.primary) || same_field(a, b, &self.alternate)
    }
}

impl Default for RecordIdentity {
    fn default() -> Self {
        Self::new("id", "Id")
    }
}

fn same_field(a: &Record, b: &Record, name: &str) -> bool {
    match (identifier(a, name), identifier(b, name)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn identifier<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    record.get(name).filter(|v| !v.is_null())
}

/// Counts of record-level edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Records appended.
    pub added: u64,
    /// Records replaced in place.
    pub replaced: u64,
    /// Records removed.
    pub removed: u64,
}

impl ApplyStats {
    fn merge(&mut self, other: ApplyStats) {
        self.added += other.added;
        self.replaced += other.replaced;
        self.removed += other.removed;
    }
}

/// Result of applying one envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Every feed named by the envelope, once each, ordered by its last
    /// change set. Includes feeds with no cached subscription.
    pub changed: Vec<String>,
    /// Change sets that found a cached collection.
    pub applied_sets: u64,
    /// Record-level edit counts.
    pub stats: ApplyStats,
}

/// Applies change envelopes to a [`SubscriptionStore`].
#[derive(Debug, Clone, Default)]
pub struct SyncProcessor {
    identity: RecordIdentity,
}

impl SyncProcessor {
    /// Creates a processor matching records by `identity`.
    pub fn new(identity: RecordIdentity) -> Self {
        Self { identity }
    }

    /// Returns the identity used for matching.
    pub fn identity(&self) -> &RecordIdentity {
        &self.identity
    }

    /// Applies every change set in `envelope` to `store`, in order.
    pub fn apply(&self, store: &SubscriptionStore, envelope: &ChangeEnvelope) -> ApplyOutcome {
        let mut outcome = ApplyOutcome {
            changed: envelope
                .changed_feeds()
                .into_iter()
                .map(str::to_string)
                .collect(),
            ..ApplyOutcome::default()
        };

        for set in &envelope.change_sets {
            if set.changes.is_empty() {
                continue;
            }
            match store.mutate_in_place(&set.url, |collection| {
                self.apply_changes(collection, &set.changes)
            }) {
                Some(stats) => {
                    outcome.applied_sets += 1;
                    outcome.stats.merge(stats);
                }
                None => debug!(feed = %set.url, "no cached subscription, skipping changes"),
            }
        }

        outcome
    }

    /// Applies changes to one collection, in order.
    ///
    /// Added and modified entities replace every matching record, or are
    /// appended if nothing matches. Deleted entities remove every matching
    /// record.
    pub fn apply_changes(&self, collection: &mut Collection, changes: &[EntityChange]) -> ApplyStats {
        let mut stats = ApplyStats::default();

        for change in changes {
            if change.state.is_upsert() {
                let mut matched = false;
                for record in collection.iter_mut() {
                    if self.identity.matches(record, &change.entity) {
                        *record = change.entity.clone();
                        matched = true;
                        stats.replaced += 1;
                    }
                }
                if !matched {
                    collection.push(change.entity.clone());
                    stats.added += 1;
                }
            } else {
                let before = collection.len();
                collection.retain(|record| !self.identity.matches(record, &change.entity));
                stats.removed += (before - collection.len()) as u64;
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_protocol::UrlChangeSet;
    use serde_json::json;

    fn processor() -> SyncProcessor {
        SyncProcessor::new(RecordIdentity::new("id", "Id"))
    }

    fn envelope(feed: &str, changes: Vec<EntityChange>) -> ChangeEnvelope {
        let mut set = UrlChangeSet::new(feed);
        set.changes = changes;
        ChangeEnvelope::new(vec![set])
    }

    #[test]
    fn added_to_empty_subscription() {
        let store = SubscriptionStore::new();
        store.set("orders", Vec::new());

        let outcome = processor().apply(
            &store,
            &envelope("orders", vec![EntityChange::added(json!({"id": 1, "amount": 10}))]),
        );

        assert_eq!(outcome.changed, vec!["orders".to_string()]);
        assert_eq!(outcome.stats.added, 1);
        assert_eq!(
            *store.get("orders").unwrap(),
            vec![json!({"id": 1, "amount": 10})]
        );
    }

    #[test]
    fn modified_replaces_in_place() {
        let store = SubscriptionStore::new();
        store.set("items", vec![json!({"id": 1, "v": 1}), json!({"id": 2, "v": 1})]);

        processor().apply(
            &store,
            &envelope("items", vec![EntityChange::modified(json!({"id": 1, "v": 2}))]),
        );

        assert_eq!(
            *store.get("items").unwrap(),
            vec![json!({"id": 1, "v": 2}), json!({"id": 2, "v": 1})]
        );
    }

    #[test]
    fn deleted_removes_match() {
        let store = SubscriptionStore::new();
        store.set("items", vec![json!({"id": 1}), json!({"id": 2})]);

        let outcome = processor().apply(
            &store,
            &envelope("items", vec![EntityChange::deleted(json!({"id": 1}))]),
        );

        assert_eq!(outcome.stats.removed, 1);
        assert_eq!(*store.get("items").unwrap(), vec![json!({"id": 2})]);
    }

    #[test]
    fn delete_of_absent_identifier_is_noop() {
        let mut collection = vec![json!({"id": 1}), json!({"id": 2})];
        let stats = processor().apply_changes(
            &mut collection,
            &[EntityChange::deleted(json!({"id": 9}))],
        );
        assert_eq!(stats, ApplyStats::default());
        assert_eq!(collection, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn dual_key_matching() {
        let identity = RecordIdentity::new("id", "Id");
        assert!(identity.matches(&json!({"id": 1}), &json!({"id": 1, "x": 2})));
        assert!(identity.matches(&json!({"Id": "a"}), &json!({"Id": "a"})));
        assert!(identity.matches(&json!({"id": 1, "Id": "a"}), &json!({"id": 2, "Id": "a"})));
        assert!(!identity.matches(&json!({"id": 1, "Id": "a"}), &json!({"id": 2, "Id": "b"})));
        assert!(!identity.matches(&json!({"id": 1}), &json!({"Id": 1})));
    }

    #[test]
    fn missing_or_null_identifiers_never_match() {
        let identity = RecordIdentity::default();
        assert!(!identity.matches(&json!({"name": "a"}), &json!({"name": "a"})));
        assert!(!identity.matches(&json!({"id": null}), &json!({"id": null})));
        assert!(!identity.matches(&json!("scalar"), &json!("scalar")));
    }

    #[test]
    fn repeated_add_is_idempotent() {
        let mut collection = Vec::new();
        let change = EntityChange::added(json!({"id": 5, "v": "x"}));
        processor().apply_changes(&mut collection, &[change.clone(), change]);
        assert_eq!(collection, vec![json!({"id": 5, "v": "x"})]);
    }

    #[test]
    fn every_match_is_replaced() {
        let mut collection = vec![
            json!({"id": 1, "Id": "a", "v": 0}),
            json!({"id": 2, "Id": "b", "v": 0}),
            json!({"id": 3, "Id": "a", "v": 0}),
        ];
        let stats = processor().apply_changes(
            &mut collection,
            &[EntityChange::modified(json!({"id": 2, "Id": "a", "v": 1}))],
        );

        assert_eq!(stats.replaced, 3);
        assert!(collection.iter().all(|r| r["v"] == 1));
    }

    #[test]
    fn every_match_is_deleted() {
        let mut collection = vec![
            json!({"id": 1, "Id": "a"}),
            json!({"id": 2, "Id": "b"}),
            json!({"id": 3, "Id": "a"}),
            json!({"id": 4, "Id": "c"}),
        ];
        processor().apply_changes(&mut collection, &[EntityChange::deleted(json!({"id": 2, "Id": "a"}))]);
        assert_eq!(collection, vec![json!({"id": 4, "Id": "c"})]);
    }

    #[test]
    fn last_applied_wins_within_batch() {
        let mut collection = Vec::new();
        processor().apply_changes(
            &mut collection,
            &[
                EntityChange::added(json!({"id": 1, "v": 1})),
                EntityChange::modified(json!({"id": 1, "v": 2})),
                EntityChange::deleted(json!({"id": 1})),
                EntityChange::added(json!({"id": 1, "v": 3})),
            ],
        );
        assert_eq!(collection, vec![json!({"id": 1, "v": 3})]);
    }

    #[test]
    fn custom_identifier_fields() {
        let processor = SyncProcessor::new(RecordIdentity::new("orderNo", "OrderNo"));
        let mut collection = vec![json!({"orderNo": 7, "id": 1})];
        processor.apply_changes(
            &mut collection,
            &[EntityChange::modified(json!({"orderNo": 7, "id": 99}))],
        );
        assert_eq!(collection, vec![json!({"orderNo": 7, "id": 99})]);
    }

    #[test]
    fn unroutable_feed_is_still_reported() {
        let store = SubscriptionStore::new();
        store.set("orders", Vec::new());

        let outcome = processor().apply(
            &store,
            &envelope("invoices", vec![EntityChange::added(json!({"id": 1}))]),
        );

        assert_eq!(outcome.changed, vec!["invoices".to_string()]);
        assert_eq!(outcome.applied_sets, 0);
        assert!(store.get("orders").unwrap().is_empty());
        assert!(!store.contains("invoices"));
    }

    #[test]
    fn suffix_routed_changes() {
        let store = SubscriptionStore::new();
        store.set("orders", Vec::new());

        processor().apply(
            &store,
            &envelope("/api/tenant/3/orders", vec![EntityChange::added(json!({"id": 1}))]),
        );

        assert_eq!(store.get("orders").unwrap().len(), 1);
    }
}
