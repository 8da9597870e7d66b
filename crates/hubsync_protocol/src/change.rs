//! Change envelopes delivered by the hub.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entity record. Records are arbitrary JSON objects.
pub type Record = Value;

/// An ordered sequence of records mirroring one server-side collection.
pub type Collection = Vec<Record>;

/// State of an entity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StateRepr")]
pub enum ChangeState {
    /// Entity was added.
    Added,
    /// Entity was modified.
    Modified,
    /// Entity was deleted.
    Deleted,
}

impl ChangeState {
    /// Returns true for states that insert or replace a record.
    pub fn is_upsert(&self) -> bool {
        matches!(self, ChangeState::Added | ChangeState::Modified)
    }

    /// Returns the state name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeState::Added => "Added",
            ChangeState::Modified => "Modified",
            ChangeState::Deleted => "Deleted",
        }
    }

    /// Converts to the numeric entity-state code some servers emit.
    pub fn to_code(&self) -> u8 {
        match self {
            ChangeState::Deleted => 2,
            ChangeState::Modified => 3,
            ChangeState::Added => 4,
        }
    }

    /// Converts from a numeric entity-state code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(ChangeState::Deleted),
            3 => Some(ChangeState::Modified),
            4 => Some(ChangeState::Added),
            _ => None,
        }
    }

    /// Parses a state name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        [ChangeState::Added, ChangeState::Modified, ChangeState::Deleted]
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for ChangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire representation of a state: either its name or its numeric code.
#[derive(Deserialize)]
#[serde(untagged)]
enum StateRepr {
    Name(String),
    Code(u64),
}

impl TryFrom<StateRepr> for ChangeState {
    type Error = ProtocolError;

    fn try_from(repr: StateRepr) -> Result<Self, Self::Error> {
        match repr {
            StateRepr::Name(name) => {
                ChangeState::from_name(&name).ok_or(ProtocolError::UnknownState(name))
            }
            StateRepr::Code(code) => u8::try_from(code)
                .ok()
                .and_then(ChangeState::from_code)
                .ok_or_else(|| ProtocolError::UnknownState(code.to_string())),
        }
    }
}

/// One change to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    /// What happened to the entity.
    #[serde(alias = "State")]
    pub state: ChangeState,
    /// The entity as it is after the change (or as it was, for deletes).
    #[serde(alias = "Entity", alias = "payload")]
    pub entity: Record,
}

impl EntityChange {
    /// Creates a change with the given state.
    pub fn new(state: ChangeState, entity: Record) -> Self {
        Self { state, entity }
    }

    /// Creates an added change.
    pub fn added(entity: Record) -> Self {
        Self::new(ChangeState::Added, entity)
    }

    /// Creates a modified change.
    pub fn modified(entity: Record) -> Self {
        Self::new(ChangeState::Modified, entity)
    }

    /// Creates a deleted change.
    pub fn deleted(entity: Record) -> Self {
        Self::new(ChangeState::Deleted, entity)
    }
}

/// Changes for a single feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlChangeSet {
    /// Feed identifier the changes belong to.
    #[serde(alias = "Url", alias = "feed")]
    pub url: String,
    /// Changes in delivery order.
    #[serde(alias = "Changes", default)]
    pub changes: Vec<EntityChange>,
}

impl UrlChangeSet {
    /// Creates an empty change set for a feed.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            changes: Vec::new(),
        }
    }

    /// Appends a change.
    pub fn with_change(mut self, change: EntityChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Counts the changes in the given state.
    pub fn count(&self, state: ChangeState) -> usize {
        self.changes.iter().filter(|c| c.state == state).count()
    }
}

/// One inbound notification batch.
///
/// An envelope is an ordered list of per-feed change sets. The same feed may
/// appear more than once; the sets are applied in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeEnvelope {
    /// Change sets in delivery order.
    pub change_sets: Vec<UrlChangeSet>,
}

impl ChangeEnvelope {
    /// Creates an envelope from change sets.
    pub fn new(change_sets: Vec<UrlChangeSet>) -> Self {
        Self { change_sets }
    }

    /// Decodes an envelope from a JSON value.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Decodes an envelope from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Returns the number of change sets.
    pub fn len(&self) -> usize {
        self.change_sets.len()
    }

    /// Returns true if the envelope has no change sets.
    pub fn is_empty(&self) -> bool {
        self.change_sets.is_empty()
    }

    /// Returns the total number of entity changes across all sets.
    pub fn change_count(&self) -> usize {
        self.change_sets.iter().map(|s| s.changes.len()).sum()
    }

    /// Returns each distinct feed identifier once.
    ///
    /// A feed that appears several times is placed where its last change set
    /// appears.
    pub fn changed_feeds(&self) -> Vec<&str> {
        let mut feeds: Vec<&str> = Vec::with_capacity(self.change_sets.len());
        for set in &self.change_sets {
            if let Some(pos) = feeds.iter().position(|f| *f == set.url) {
                feeds.remove(pos);
            }
            feeds.push(&set.url);
        }
        feeds
    }
}

impl FromIterator<UrlChangeSet> for ChangeEnvelope {
    fn from_iter<I: IntoIterator<Item = UrlChangeSet>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_codes() {
        for state in [ChangeState::Added, ChangeState::Modified, ChangeState::Deleted] {
            assert_eq!(ChangeState::from_code(state.to_code()), Some(state));
        }
        assert_eq!(ChangeState::from_code(0), None);
        assert!(ChangeState::Added.is_upsert());
        assert!(!ChangeState::Deleted.is_upsert());
    }

    #[test]
    fn decode_envelope_by_name_and_code() {
        let envelope = ChangeEnvelope::from_value(json!([
            {
                "url": "orders",
                "changes": [
                    {"state": "Added", "entity": {"id": 1, "amount": 10}},
                    {"state": 2, "entity": {"id": 7}}
                ]
            }
        ]))
        .unwrap();

        assert_eq!(envelope.len(), 1);
        let set = &envelope.change_sets[0];
        assert_eq!(set.url, "orders");
        assert_eq!(set.changes[0], EntityChange::added(json!({"id": 1, "amount": 10})));
        assert_eq!(set.changes[1].state, ChangeState::Deleted);
    }

    #[test]
    fn decode_pascal_case_fields() {
        let envelope = ChangeEnvelope::from_value(json!([
            {"Url": "/api/items", "Changes": [{"State": "modified", "Entity": {"Id": 3}}]}
        ]))
        .unwrap();

        assert_eq!(envelope.change_sets[0].url, "/api/items");
        assert_eq!(envelope.change_sets[0].changes[0].state, ChangeState::Modified);
    }

    #[test]
    fn unknown_state_rejected() {
        let result = ChangeEnvelope::from_value(json!([
            {"url": "orders", "changes": [{"state": "Detached", "entity": {}}]}
        ]));
        assert!(matches!(result, Err(ProtocolError::InvalidEnvelope(_))));
    }

    #[test]
    fn changed_feeds_keeps_last_occurrence() {
        let envelope: ChangeEnvelope = vec![
            UrlChangeSet::new("a"),
            UrlChangeSet::new("b"),
            UrlChangeSet::new("a"),
            UrlChangeSet::new("c"),
        ]
        .into_iter()
        .collect();

        assert_eq!(envelope.changed_feeds(), vec!["b", "a", "c"]);
    }

    #[test]
    fn change_counts() {
        let set = UrlChangeSet::new("orders")
            .with_change(EntityChange::added(json!({"id": 1})))
            .with_change(EntityChange::deleted(json!({"id": 2})))
            .with_change(EntityChange::added(json!({"id": 3})));

        assert_eq!(set.count(ChangeState::Added), 2);
        assert_eq!(set.count(ChangeState::Deleted), 1);
        assert_eq!(ChangeEnvelope::new(vec![set]).change_count(), 3);
    }
}
