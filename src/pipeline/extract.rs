//! Extraction stage - stages reviewable messages from a chat export.
//!
//! Filters export messages for the marker hashtag, deduplicates against
//! finalized reviews and already-staged messages by the
//! `(source_user_id, source_message_id)` idempotency key, and stages the
//! rest as pending. A single malformed message never aborts the import.

use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::export::{ChatExport, ExportMessage};
use crate::store::{NewStagedMessage, PipelineStore};

/// Default marker hashtag (without the `#`).
pub const DEFAULT_MARKER: &str = "review";

/// Errors constructing the extraction stage.
#[derive(Debug, Error)]
pub enum ExtractConfigError {
    /// The marker hashtag produced an invalid filter pattern.
    #[error("invalid marker hashtag '{marker}': {source}")]
    InvalidMarker {
        /// The offending marker.
        marker: String,
        /// Regex construction failure.
        source: regex::Error,
    },
}

/// Counters reported by one extract run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Messages carrying the marker hashtag.
    pub matched: u32,
    /// Newly staged messages.
    pub staged: u32,
    /// Skipped: a finalized review already carries the key.
    pub duplicate_reviews: u32,
    /// Skipped: a staged message already carries the key.
    pub duplicate_staged: u32,
    /// Malformed or failing messages, logged and skipped.
    pub errors: u32,
}

/// Extraction stage over a chat export.
pub struct ExtractStage {
    store: PipelineStore,
    marker: Regex,
}

impl ExtractStage {
    /// Creates the stage with a marker hashtag (given without the `#`).
    ///
    /// # Errors
    ///
    /// Returns [`ExtractConfigError::InvalidMarker`] if the marker cannot
    /// form a valid filter pattern.
    pub fn new(store: PipelineStore, marker: &str) -> Result<Self, ExtractConfigError> {
        let pattern = format!(r"(?i)#{}\b", regex::escape(marker));
        let marker_regex = Regex::new(&pattern).map_err(|source| {
            ExtractConfigError::InvalidMarker {
                marker: marker.to_string(),
                source,
            }
        })?;

        Ok(Self {
            store,
            marker: marker_regex,
        })
    }

    /// True when the text carries the marker hashtag.
    #[must_use]
    pub fn is_reviewable(&self, text: &str) -> bool {
        self.marker.is_match(text)
    }

    /// Stages every reviewable message of the export.
    ///
    /// # Errors
    ///
    /// This never fails on per-message problems; only the report reflects
    /// them.
    #[instrument(skip(self, export), fields(source_chat_id = %source_chat_id, messages = export.messages.len()))]
    pub async fn run(&self, export: &ChatExport, source_chat_id: &str) -> ExtractReport {
        let mut report = ExtractReport::default();

        for message in &export.messages {
            if !message.is_user_message() {
                continue;
            }
            let text = message.flattened_text();
            if !self.is_reviewable(&text) {
                continue;
            }
            report.matched += 1;

            self.stage_one(message, &text, source_chat_id, &mut report)
                .await;
        }

        debug!(?report, "extract run finished");
        report
    }

    async fn stage_one(
        &self,
        message: &ExportMessage,
        text: &str,
        source_chat_id: &str,
        report: &mut ExtractReport,
    ) {
        let Some(source_user_id) = message.from_id.as_deref() else {
            warn!(message_id = message.id, "export message has no sender id");
            report.errors += 1;
            return;
        };
        let Some(observed_at) = message.date.as_deref() else {
            warn!(message_id = message.id, "export message has no date");
            report.errors += 1;
            return;
        };
        let source_message_id = message.id.to_string();

        // Two independent duplicate counters: finalized reviews first,
        // then already-staged rows.
        match self
            .store
            .review_exists(source_user_id, &source_message_id)
            .await
        {
            Ok(true) => {
                report.duplicate_reviews += 1;
                return;
            }
            Ok(false) => {}
            Err(error) => {
                warn!(message_id = message.id, error = %error, "review dedup check failed");
                report.errors += 1;
                return;
            }
        }

        match self
            .store
            .message_exists(source_user_id, &source_message_id)
            .await
        {
            Ok(true) => {
                report.duplicate_staged += 1;
                return;
            }
            Ok(false) => {}
            Err(error) => {
                warn!(message_id = message.id, error = %error, "staging dedup check failed");
                report.errors += 1;
                return;
            }
        }

        let new_message = NewStagedMessage {
            source_user_id,
            source_message_id: &source_message_id,
            display_name: message.from.as_deref(),
            text,
            source_chat_id,
            observed_at,
        };

        match self.store.insert_message(&new_message).await {
            Ok(_) => report.staged += 1,
            Err(error) => {
                warn!(message_id = message.id, error = %error, "staging failed");
                report.errors += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::store::MessageStatus;

    async fn stage() -> ExtractStage {
        let db = Database::new_in_memory().await.unwrap();
        ExtractStage::new(PipelineStore::new(db), DEFAULT_MARKER).unwrap()
    }

    fn export(messages: serde_json::Value) -> ChatExport {
        serde_json::from_value(serde_json::json!({ "messages": messages })).unwrap()
    }

    fn review_message(id: i64, text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "type": "message",
            "date": "2026-05-01T19:30:00",
            "from": "Maya",
            "from_id": "user100",
            "text": text
        })
    }

    // ==================== Marker Tests ====================

    #[tokio::test]
    async fn test_marker_matching() {
        let stage = stage().await;
        assert!(stage.is_reviewable("Loved it #review"));
        assert!(stage.is_reviewable("#REVIEW at the start"));
        assert!(!stage.is_reviewable("no marker here"));
        assert!(!stage.is_reviewable("#reviewer is a different tag"));
    }

    #[tokio::test]
    async fn test_marker_with_regex_metacharacters() {
        let db = Database::new_in_memory().await.unwrap();
        let stage = ExtractStage::new(PipelineStore::new(db), "book+review").unwrap();
        assert!(stage.is_reviewable("great stuff #book+review"));
        assert!(!stage.is_reviewable("great stuff #bookreview"));
    }

    // ==================== Run Tests ====================

    #[tokio::test]
    async fn test_run_stages_marked_messages_only() {
        let stage = stage().await;
        let export = export(serde_json::json!([
            review_message(1, "Finished The Hobbit #review"),
            review_message(2, "just chatting"),
            {"id": 3, "type": "service", "text": "pinned a message"}
        ]));

        let report = stage.run(&export, "chat-1").await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.staged, 1);
        assert_eq!(report.errors, 0);

        let staged = stage
            .store
            .list_messages_by_status(MessageStatus::Pending, None)
            .await
            .unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].source_message_id, "1");
        assert_eq!(staged[0].source_chat_id, "chat-1");
    }

    #[tokio::test]
    async fn test_run_counts_staged_duplicates() {
        let stage = stage().await;
        let export = export(serde_json::json!([
            review_message(1, "Finished The Hobbit #review")
        ]));

        let first = stage.run(&export, "chat-1").await;
        assert_eq!(first.staged, 1);

        // Second run of the same export: one "already staged", zero new rows
        let second = stage.run(&export, "chat-1").await;
        assert_eq!(second.staged, 0);
        assert_eq!(second.duplicate_staged, 1);
        assert_eq!(second.duplicate_reviews, 0);

        assert_eq!(
            stage
                .store
                .count_messages_by_status(MessageStatus::Pending)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_counts_review_duplicates() {
        let stage = stage().await;
        stage
            .store
            .insert_review(&crate::store::NewReview {
                book_id: None,
                source_user_id: "user100",
                source_message_id: "1",
                text: "Finished The Hobbit #review",
                sentiment: None,
                reviewed_at: "2026-05-01T19:30:00",
            })
            .await
            .unwrap();

        let export = export(serde_json::json!([
            review_message(1, "Finished The Hobbit #review")
        ]));
        let report = stage.run(&export, "chat-1").await;

        assert_eq!(report.duplicate_reviews, 1);
        assert_eq!(report.duplicate_staged, 0);
        assert_eq!(report.staged, 0);
    }

    #[tokio::test]
    async fn test_run_continues_past_malformed_messages() {
        let stage = stage().await;
        let export = export(serde_json::json!([
            // no from_id
            {"id": 1, "type": "message", "date": "2026-05-01T19:30:00", "text": "bad row #review"},
            // no date
            {"id": 2, "type": "message", "from_id": "user100", "text": "bad row #review"},
            review_message(3, "good row #review")
        ]));

        let report = stage.run(&export, "chat-1").await;
        assert_eq!(report.errors, 2);
        assert_eq!(report.staged, 1, "malformed rows must not abort the batch");
    }

    #[tokio::test]
    async fn test_run_same_user_different_messages_both_staged() {
        let stage = stage().await;
        let export = export(serde_json::json!([
            review_message(1, "first #review"),
            review_message(2, "second #review")
        ]));

        let report = stage.run(&export, "chat-1").await;
        assert_eq!(report.staged, 2);
    }
}
