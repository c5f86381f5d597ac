//! Chat export parsing.
//!
//! The bulk importer reads the JSON export produced by the chat platform's
//! desktop client: a top-level object with a `messages` array whose `text`
//! field is either a plain string or an array of runs (strings mixed with
//! `{ "type": ..., "text": ... }` entity objects). Parsing is tolerant -
//! unknown fields are ignored and missing senders yield `None` rather than
//! failing the whole file.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while loading a chat export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Export file could not be read.
    #[error("cannot read export file: {0}")]
    Io(#[from] std::io::Error),

    /// Export file is not valid JSON in the expected shape.
    #[error("cannot parse export file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level chat export document.
#[derive(Debug, Deserialize)]
pub struct ChatExport {
    /// Chat display name, when the exporter includes one.
    pub name: Option<String>,
    /// Messages in export order.
    pub messages: Vec<ExportMessage>,
}

/// One message entry from the export.
#[derive(Debug, Deserialize)]
pub struct ExportMessage {
    /// Message id within the source chat.
    pub id: i64,
    /// Entry kind; service entries ("service") carry no review text.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Message timestamp as written by the exporter (ISO-8601, local time).
    pub date: Option<String>,
    /// Sender display name.
    pub from: Option<String>,
    /// Stable sender identifier (e.g. `user12345678`).
    pub from_id: Option<String>,
    /// Plain string or array of text runs.
    #[serde(default)]
    pub text: TextField,
}

/// The polymorphic `text` field of an export message.
#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
pub enum TextField {
    /// No text at all (service messages).
    #[default]
    Empty,
    /// Plain string body.
    Plain(String),
    /// Mixed runs of strings and entity objects.
    Runs(Vec<TextRun>),
}

/// One run inside an array-valued `text` field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TextRun {
    /// Bare string segment.
    Plain(String),
    /// Entity segment (hashtag, mention, link, ...) with its visible text.
    Entity {
        /// Visible text of the entity.
        text: String,
    },
}

impl ExportMessage {
    /// Flattens the polymorphic text field into one string.
    #[must_use]
    pub fn flattened_text(&self) -> String {
        match &self.text {
            TextField::Empty => String::new(),
            TextField::Plain(s) => s.clone(),
            TextField::Runs(runs) => runs
                .iter()
                .map(|run| match run {
                    TextRun::Plain(s) => s.as_str(),
                    TextRun::Entity { text } => text.as_str(),
                })
                .collect(),
        }
    }

    /// True for ordinary user messages (service entries are skipped).
    #[must_use]
    pub fn is_user_message(&self) -> bool {
        self.kind.is_empty() || self.kind == "message"
    }
}

/// Loads and parses a chat export file.
///
/// # Errors
///
/// Returns [`ExportError::Io`] if the file cannot be read and
/// [`ExportError::Parse`] if the JSON shape is unrecognizable.
pub fn load_export(path: &Path) -> Result<ChatExport, ExportError> {
    let raw = fs::read_to_string(path)?;
    let export = serde_json::from_str(&raw)?;
    Ok(export)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_export_deserialize_plain_text() {
        let json = serde_json::json!({
            "name": "book club",
            "messages": [{
                "id": 101,
                "type": "message",
                "date": "2026-05-01T19:30:00",
                "from": "Maya",
                "from_id": "user100",
                "text": "Just finished The Hobbit #review"
            }]
        });

        let export: ChatExport = serde_json::from_value(json).unwrap();
        assert_eq!(export.name.as_deref(), Some("book club"));
        assert_eq!(export.messages.len(), 1);
        assert_eq!(
            export.messages[0].flattened_text(),
            "Just finished The Hobbit #review"
        );
        assert!(export.messages[0].is_user_message());
    }

    #[test]
    fn test_export_deserialize_text_runs() {
        let json = serde_json::json!({
            "messages": [{
                "id": 102,
                "type": "message",
                "from_id": "user100",
                "text": [
                    "Loved ",
                    {"type": "italic", "text": "Dune"},
                    " so much ",
                    {"type": "hashtag", "text": "#review"}
                ]
            }]
        });

        let export: ChatExport = serde_json::from_value(json).unwrap();
        assert_eq!(
            export.messages[0].flattened_text(),
            "Loved Dune so much #review"
        );
    }

    #[test]
    fn test_export_deserialize_service_message() {
        let json = serde_json::json!({
            "messages": [{
                "id": 1,
                "type": "service",
                "text": ""
            }]
        });

        let export: ChatExport = serde_json::from_value(json).unwrap();
        assert!(!export.messages[0].is_user_message());
    }

    #[test]
    fn test_export_deserialize_missing_text() {
        let json = serde_json::json!({
            "messages": [{"id": 2, "type": "message"}]
        });

        let export: ChatExport = serde_json::from_value(json).unwrap();
        assert_eq!(export.messages[0].flattened_text(), "");
    }

    #[test]
    fn test_load_export_missing_file_is_io_error() {
        let result = load_export(Path::new("/nonexistent/export.json"));
        assert!(matches!(result, Err(ExportError::Io(_))));
    }

    #[test]
    fn test_load_export_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        fs::write(&path, "not json at all").unwrap();

        let result = load_export(&path);
        assert!(matches!(result, Err(ExportError::Parse(_))));
    }
}
