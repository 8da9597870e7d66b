//! Apply command implementation.

use hubsync_engine::{ApplyStats, RecordIdentity, SubscriptionStore, SyncProcessor};
use hubsync_protocol::{ChangeEnvelope, Collection};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Result of applying an envelope to a snapshot.
#[derive(Debug, Serialize)]
pub struct ApplyResult {
    /// Feed key the snapshot was cached under.
    pub feed: String,
    /// Every feed the envelope named.
    pub changed: Vec<String>,
    /// Change sets that routed to the snapshot.
    pub applied_sets: u64,
    /// Records appended.
    pub added: u64,
    /// Records replaced.
    pub replaced: u64,
    /// Records removed.
    pub removed: u64,
    /// The snapshot after reconciliation.
    pub collection: Collection,
}

/// Options for the apply command.
pub struct ApplyOptions<'a> {
    /// Snapshot file (a JSON array of records).
    pub snapshot: &'a Path,
    /// Envelope file.
    pub envelope: &'a Path,
    /// Feed key for the snapshot. Defaults to the first feed in the envelope.
    pub feed: Option<&'a str>,
    /// Primary identifier field.
    pub primary_key: &'a str,
    /// Alternate identifier field.
    pub alternate_key: &'a str,
}

/// Runs the apply command.
pub fn run(options: &ApplyOptions<'_>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = apply(options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result)?;
        }
    }

    Ok(())
}

/// Applies the envelope file to the snapshot file.
pub fn apply(options: &ApplyOptions<'_>) -> Result<ApplyResult, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(options.snapshot)
        .map_err(|e| format!("Failed to read snapshot {}: {e}", options.snapshot.display()))?;
    let snapshot: Collection = serde_json::from_slice(&bytes)
        .map_err(|e| format!("Snapshot must be a JSON array of records: {e}"))?;
    let envelope = super::read_envelope(options.envelope)?;

    let feed = match options.feed {
        Some(feed) => feed.to_string(),
        None => default_feed(&envelope)?,
    };
    debug!(feed = %feed, records = snapshot.len(), "applying envelope");

    let store = SubscriptionStore::new();
    store.set(feed.clone(), snapshot);
    let processor = SyncProcessor::new(RecordIdentity::new(
        options.primary_key,
        options.alternate_key,
    ));
    let outcome = processor.apply(&store, &envelope);
    let ApplyStats {
        added,
        replaced,
        removed,
    } = outcome.stats;

    let collection = store
        .get(&feed)
        .map(|c| c.as_ref().clone())
        .unwrap_or_default();

    Ok(ApplyResult {
        feed,
        changed: outcome.changed,
        applied_sets: outcome.applied_sets,
        added,
        replaced,
        removed,
        collection,
    })
}

fn default_feed(envelope: &ChangeEnvelope) -> Result<String, Box<dyn std::error::Error>> {
    envelope
        .change_sets
        .first()
        .map(|set| set.url.clone())
        .ok_or_else(|| "Envelope is empty; pass --feed to name the snapshot".into())
}

fn print_text_output(result: &ApplyResult) -> Result<(), Box<dyn std::error::Error>> {
    println!("HubSync Apply");
    println!("=============");
    println!();
    println!("Feed:          {}", result.feed);
    println!("Changed feeds: {}", result.changed.join(", "));
    println!("Applied sets:  {}", result.applied_sets);
    println!();
    println!("Records:");
    println!("  Added:    {}", result.added);
    println!("  Replaced: {}", result.replaced);
    println!("  Removed:  {}", result.removed);
    println!("  Total:    {}", result.collection.len());
    println!();
    println!("{}", serde_json::to_string_pretty(&result.collection)?);
    Ok(())
}
