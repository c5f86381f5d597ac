//! Auto-review stage - non-interactive confirmation of high-confidence
//! extractions.
//!
//! The companion to the interactive extraction review: high-confidence
//! `needs_review` rows are confirmed in bulk, medium and low always wait
//! for a human. Dry-run previews the outcome without writing.

use tracing::instrument;

use crate::store::{
    Confidence, ExtractionAction, ExtractionFilter, ExtractionStatus, PipelineStore, StoreError,
};

/// Counters reported by one auto-review run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoReviewReport {
    /// Rows examined.
    pub examined: u32,
    /// High-confidence rows confirmed (or that would be, in dry-run).
    pub confirmed: u32,
    /// Rows left for the interactive review.
    pub left_for_review: u32,
}

/// Auto-review stage.
pub struct AutoReviewStage {
    store: PipelineStore,
    dry_run: bool,
}

impl AutoReviewStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: PipelineStore) -> Self {
        Self {
            store,
            dry_run: false,
        }
    }

    /// Previews the outcome without any writes.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Confirms high-confidence `needs_review` extractions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the work queue cannot be read or a
    /// confirmation write fails.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn run(&self, limit: Option<i64>) -> Result<AutoReviewReport, StoreError> {
        let rows = self
            .store
            .list_extractions_by_status(ExtractionStatus::NeedsReview, ExtractionFilter::All, limit)
            .await?;

        let mut report = AutoReviewReport::default();

        for extraction in rows {
            report.examined += 1;
            if extraction.confidence() == Confidence::High {
                if !self.dry_run {
                    self.store
                        .transition_extraction(extraction.id, ExtractionAction::Confirm, None)
                        .await?;
                }
                report.confirmed += 1;
            } else {
                report.left_for_review += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::store::{NewStagedExtraction, NewStagedMessage};

    async fn store_with_reviews(confidences: &[Confidence]) -> PipelineStore {
        let db = Database::new_in_memory().await.unwrap();
        let store = PipelineStore::new(db);
        for (n, confidence) in confidences.iter().enumerate() {
            let message_id = store
                .insert_message(&NewStagedMessage {
                    source_user_id: "user100",
                    source_message_id: &format!("{n}"),
                    display_name: None,
                    text: "text #review",
                    source_chat_id: "chat-1",
                    observed_at: "2026-05-01T19:30:00",
                })
                .await
                .unwrap();
            store
                .insert_extraction(&NewStagedExtraction {
                    message_id,
                    title: "The Hobbit",
                    author: None,
                    confidence: *confidence,
                    alternatives: &[],
                    status: ExtractionStatus::NeedsReview,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_auto_review_confirms_high_only() {
        let store =
            store_with_reviews(&[Confidence::High, Confidence::Medium, Confidence::Low]).await;
        let stage = AutoReviewStage::new(store.clone());

        let report = stage.run(None).await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.left_for_review, 2);

        assert_eq!(
            store
                .count_extractions_by_status(ExtractionStatus::Confirmed)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .count_extractions_by_status(ExtractionStatus::NeedsReview)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_auto_review_dry_run_writes_nothing() {
        let store = store_with_reviews(&[Confidence::High, Confidence::High]).await;
        let stage = AutoReviewStage::new(store.clone()).with_dry_run(true);

        let report = stage.run(None).await.unwrap();
        assert_eq!(report.confirmed, 2);

        assert_eq!(
            store
                .count_extractions_by_status(ExtractionStatus::NeedsReview)
                .await
                .unwrap(),
            2,
            "dry-run must not mutate durable state"
        );
    }

    #[tokio::test]
    async fn test_auto_review_respects_limit() {
        let store = store_with_reviews(&[Confidence::High, Confidence::High]).await;
        let stage = AutoReviewStage::new(store.clone());

        let report = stage.run(Some(1)).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.confirmed, 1);
    }
}
