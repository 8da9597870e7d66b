//! CLI command implementations.

pub mod apply;
pub mod inspect;
pub mod route;

use hubsync_protocol::ChangeEnvelope;
use std::path::Path;

/// Reads a change envelope from a JSON file.
///
/// Accepts either the bare list of change sets or the argument list of a
/// change message (a one-element array wrapping the list).
pub fn read_envelope(path: &Path) -> Result<ChangeEnvelope, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read envelope {}: {e}", path.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;

    let unwrapped = match value.as_array().map(Vec::as_slice) {
        Some([inner @ serde_json::Value::Array(_)]) => inner.clone(),
        _ => value,
    };
    Ok(ChangeEnvelope::from_value(unwrapped)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_bare_envelope() {
        let file = write_json(r#"[{"url": "orders", "changes": []}]"#);
        let envelope = read_envelope(file.path()).unwrap();
        assert_eq!(envelope.changed_feeds(), vec!["orders"]);
    }

    #[test]
    fn reads_wrapped_envelope() {
        let file = write_json(r#"[[{"url": "orders", "changes": []}, {"url": "items"}]]"#);
        let envelope = read_envelope(file.path()).unwrap();
        assert_eq!(envelope.len(), 2);
    }

    #[test]
    fn rejects_malformed_envelope() {
        let file = write_json(r#"{"url": "orders"}"#);
        assert!(read_envelope(file.path()).is_err());
    }
}
