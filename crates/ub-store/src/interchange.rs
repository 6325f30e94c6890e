//! Export/import file formats
//!
//! Export is a self-describing JSON snapshot. Import accepts that envelope,
//! a bare JSON string array, or newline-delimited plain text: a payload that
//! fails JSON parsing is retried as line-delimited text before being
//! rejected.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use ub_core::Pattern;

pub const EXTENSION_NAME: &str = "UserBlocker";
pub const FORMAT_VERSION: &str = "1.0";

/// Error type for import payload parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no usable entries in import payload")]
    NoEntries,
}

/// Self-describing export snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ExportEnvelope {
    pub extension: String,
    pub version: String,
    pub export_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_users: Option<usize>,
    pub blocked_users: Vec<String>,
}

/// Build the export snapshot for the current list.
pub fn export_envelope(patterns: &[Pattern]) -> ExportEnvelope {
    ExportEnvelope {
        extension: EXTENSION_NAME.to_string(),
        version: FORMAT_VERSION.to_string(),
        export_date: Utc::now().to_rfc3339(),
        total_users: Some(patterns.len()),
        blocked_users: patterns.iter().map(|p| p.as_str().to_string()).collect(),
    }
}

/// Extract raw entries from an import payload. Entries are not validated
/// here; that is `import_many`'s job, one entry at a time.
pub fn parse_import(text: &str) -> Result<Vec<String>, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        // Valid JSON must carry entries in a recognized shape; a JSON
        // scalar is not retried as plain text.
        let entries = entries_from_json(&value).ok_or(ParseError::NoEntries)?;
        if entries.is_empty() {
            return Err(ParseError::NoEntries);
        }
        return Ok(entries);
    }

    let lines: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if lines.is_empty() {
        return Err(ParseError::NoEntries);
    }
    Ok(lines)
}

/// Envelope `blockedUsers` array or bare array. Non-string items are not
/// pattern entries and are dropped here.
fn entries_from_json(value: &Value) -> Option<Vec<String>> {
    let array = match value {
        Value::Object(map) => map.get("blockedUsers")?.as_array()?,
        Value::Array(array) => array,
        _ => return None,
    };
    Some(
        array
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::store::PatternStore;

    #[test]
    fn test_parse_envelope() {
        let text = r#"{
            "extension": "UserBlocker",
            "version": "1.0",
            "exportDate": "2024-05-01T00:00:00Z",
            "blockedUsers": ["alice", "bob"]
        }"#;
        assert_eq!(parse_import(text).unwrap(), ["alice", "bob"]);
    }

    #[test]
    fn test_parse_bare_array_drops_non_strings() {
        assert_eq!(
            parse_import(r#"["alice", 42, "bob"]"#).unwrap(),
            ["alice", "bob"]
        );
    }

    #[test]
    fn test_parse_falls_back_to_lines() {
        assert_eq!(
            parse_import("alice\n\n  bob  \ncarol\n").unwrap(),
            ["alice", "bob", "carol"]
        );
    }

    #[test]
    fn test_parse_rejects_unusable_payloads() {
        assert!(matches!(parse_import(""), Err(ParseError::NoEntries)));
        assert!(matches!(parse_import("   \n  "), Err(ParseError::NoEntries)));
        assert!(matches!(
            parse_import(r#"{"unrelated": true}"#),
            Err(ParseError::NoEntries)
        ));
        assert!(matches!(
            parse_import(r#"{"blockedUsers": []}"#),
            Err(ParseError::NoEntries)
        ));
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut store = PatternStore::new(MemoryBackend::new());
        store.set_all(["alice", "troll*", "r\u{e9}my"]).unwrap();

        let exported = store.get_all().unwrap();
        let envelope = export_envelope(&exported);
        let file = serde_json::to_string_pretty(&envelope).unwrap();

        // Importing the exported file into a fresh store reproduces the
        // list with zero invalid entries and zero unexpected duplicates.
        let mut fresh = PatternStore::new(MemoryBackend::new());
        let entries = parse_import(&file).unwrap();
        let report = fresh.import_many(entries).unwrap();
        assert_eq!(report.added, 3);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.invalid, 0);

        let round_tripped = fresh.get_all().unwrap();
        assert_eq!(round_tripped, exported);
    }
}
