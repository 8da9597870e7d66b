//! Inspect command implementation.

use hubsync_protocol::{ChangeEnvelope, ChangeState};
use serde::Serialize;
use std::path::Path;

/// Envelope inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Envelope file path.
    pub path: String,
    /// Number of change sets.
    pub change_set_count: usize,
    /// Number of entity changes.
    pub change_count: usize,
    /// Distinct feeds, in dispatch order.
    pub feeds: Vec<String>,
    /// Per change set statistics.
    pub change_sets: Vec<ChangeSetStats>,
}

/// Statistics for a single change set.
#[derive(Debug, Serialize)]
pub struct ChangeSetStats {
    /// Feed identifier.
    pub url: String,
    /// Added entities.
    pub added: usize,
    /// Modified entities.
    pub modified: usize,
    /// Deleted entities.
    pub deleted: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let envelope = super::read_envelope(path)?;
    let result = inspect(path, &envelope);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Summarizes an envelope.
pub fn inspect(path: &Path, envelope: &ChangeEnvelope) -> InspectResult {
    InspectResult {
        path: path.display().to_string(),
        change_set_count: envelope.len(),
        change_count: envelope.change_count(),
        feeds: envelope
            .changed_feeds()
            .into_iter()
            .map(str::to_string)
            .collect(),
        change_sets: envelope
            .change_sets
            .iter()
            .map(|set| ChangeSetStats {
                url: set.url.clone(),
                added: set.count(ChangeState::Added),
                modified: set.count(ChangeState::Modified),
                deleted: set.count(ChangeState::Deleted),
            })
            .collect(),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("HubSync Envelope Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Change sets: {}", result.change_set_count);
    println!("Changes:     {}", result.change_count);
    println!("Feeds:       {}", result.feeds.join(", "));

    if !result.change_sets.is_empty() {
        println!();
        println!("Change sets:");
        for (i, set) in result.change_sets.iter().enumerate() {
            println!(
                "  [{}] {}: +{} ~{} -{}",
                i, set.url, set.added, set.modified, set.deleted
            );
        }
    }
}
