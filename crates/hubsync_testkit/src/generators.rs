//! Property-based test generators using proptest.
//!
//! Records carry a small integer `id` so generated changes collide with
//! each other often.

use hubsync_protocol::{ChangeEnvelope, ChangeState, EntityChange, Record, UrlChangeSet};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

/// Largest generated identifier.
pub const MAX_ID: u32 = 8;

/// Strategy for change states.
pub fn change_state_strategy() -> impl Strategy<Value = ChangeState> {
    prop_oneof![
        Just(ChangeState::Added),
        Just(ChangeState::Modified),
        Just(ChangeState::Deleted),
    ]
}

/// Strategy for a record with an `id` in `0..=MAX_ID` and a payload field.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (0..=MAX_ID, any::<i32>()).prop_map(|(id, v)| json!({"id": id, "v": v}))
}

/// Strategy for a collection with unique identifiers.
pub fn collection_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::btree_map(0..=MAX_ID, any::<i32>(), 0..6).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(id, v)| json!({"id": id, "v": v}))
            .collect()
    })
}

/// Strategy for one entity change.
pub fn entity_change_strategy() -> impl Strategy<Value = EntityChange> {
    (change_state_strategy(), record_strategy())
        .prop_map(|(state, entity)| EntityChange::new(state, entity))
}

/// Strategy for a batch of upserts (no deletes).
pub fn upsert_batch_strategy() -> impl Strategy<Value = Vec<EntityChange>> {
    prop::collection::vec(
        (any::<bool>(), record_strategy()).prop_map(|(added, entity)| {
            if added {
                EntityChange::added(entity)
            } else {
                EntityChange::modified(entity)
            }
        }),
        1..20,
    )
}

/// Strategy for a batch of mixed changes.
pub fn change_batch_strategy() -> impl Strategy<Value = Vec<EntityChange>> {
    prop::collection::vec(entity_change_strategy(), 0..20)
}

/// Strategy for feed names.
pub fn feed_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}(/[a-z]{1,8}){0,2}").expect("Invalid regex")
}

/// Strategy for an envelope over the given feeds.
pub fn envelope_strategy(feeds: Vec<String>) -> impl Strategy<Value = ChangeEnvelope> {
    prop::collection::vec(
        (prop::sample::select(feeds), change_batch_strategy()),
        0..4,
    )
    .prop_map(|sets| {
        sets.into_iter()
            .map(|(feed, changes)| {
                let mut set = UrlChangeSet::new(feed);
                set.changes = changes;
                set
            })
            .collect::<ChangeEnvelope>()
    })
}

/// Strategy for reconnect `(base_delay, variance)` pairs.
pub fn backoff_strategy() -> impl Strategy<Value = (Duration, Duration)> {
    (0u64..10_000, 0u64..10_000)
        .prop_map(|(base, variance)| (Duration::from_millis(base), Duration::from_millis(variance)))
}
