//! Reconciliation test vectors.
//!
//! Each vector pairs a cached collection and an inbound envelope, in wire
//! form, with the collection expected after the envelope is applied.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A reconciliation vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Feed key the snapshot is cached under.
    pub feed: String,
    /// Cached collection before the envelope.
    pub snapshot: Value,
    /// Envelope as received from the hub.
    pub envelope: Value,
    /// Cached collection after the envelope.
    pub expected: Value,
}

fn vector(
    id: &str,
    description: &str,
    feed: &str,
    snapshot: Value,
    envelope: Value,
    expected: Value,
) -> ReconcileVector {
    ReconcileVector {
        id: id.into(),
        description: description.into(),
        feed: feed.into(),
        snapshot,
        envelope,
        expected,
    }
}

/// Vectors using the default `id` / `Id` identifier fields.
pub fn reconcile_vectors() -> Vec<ReconcileVector> {
    vec![
        vector(
            "added_to_empty",
            "Added entity is appended to an empty subscription",
            "orders",
            json!([]),
            json!([{"url": "orders", "changes": [
                {"state": "Added", "entity": {"id": 1, "amount": 10}}
            ]}]),
            json!([{"id": 1, "amount": 10}]),
        ),
        vector(
            "modified_in_place",
            "Modified entity replaces the match and keeps its position",
            "items",
            json!([{"id": 1, "v": 1}, {"id": 2, "v": 1}]),
            json!([{"url": "items", "changes": [
                {"state": "Modified", "entity": {"id": 1, "v": 2}}
            ]}]),
            json!([{"id": 1, "v": 2}, {"id": 2, "v": 1}]),
        ),
        vector(
            "deleted",
            "Deleted entity removes the match",
            "items",
            json!([{"id": 1}, {"id": 2}]),
            json!([{"url": "items", "changes": [
                {"state": "Deleted", "entity": {"id": 1}}
            ]}]),
            json!([{"id": 2}]),
        ),
        vector(
            "numeric_states",
            "States encoded as numeric codes",
            "items",
            json!([{"id": 1}, {"id": 2}]),
            json!([{"url": "items", "changes": [
                {"state": 2, "entity": {"id": 1}},
                {"state": 4, "entity": {"id": 3}},
                {"state": 3, "entity": {"id": 2, "v": 9}}
            ]}]),
            json!([{"id": 2, "v": 9}, {"id": 3}]),
        ),
        vector(
            "pascal_case_envelope",
            "PascalCase field names and alternate identifiers",
            "people",
            json!([{"Id": "a", "name": "Ann"}]),
            json!([{"Url": "/api/people", "Changes": [
                {"State": "Modified", "Entity": {"Id": "a", "name": "Anna"}}
            ]}]),
            json!([{"Id": "a", "name": "Anna"}]),
        ),
        vector(
            "unroutable",
            "Changes for an unknown feed leave the cache alone",
            "orders",
            json!([{"id": 1}]),
            json!([{"url": "invoices", "changes": [
                {"state": "Added", "entity": {"id": 2}}
            ]}]),
            json!([{"id": 1}]),
        ),
    ]
}

/// Returns all vectors as a JSON document.
pub fn all_vectors_json() -> String {
    serde_json::to_string_pretty(&reconcile_vectors()).unwrap_or_default()
}
