//! Staged extraction rows - LLM extraction results awaiting review.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row};
use tracing::instrument;

use super::transitions::{ExtractionAction, extraction_transition};
use super::{PipelineStore, Result, StoreError, check_affected};

/// Coarse reliability estimate attached to an automated extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// The extractor is sure; eligible for auto-confirmation.
    High,
    /// Plausible but worth a human glance.
    Medium,
    /// Needs a human.
    Low,
}

impl Confidence {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("invalid confidence: {s}")),
        }
    }
}

/// Status of a staged extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Waiting for confirmation (interactive or auto-review).
    NeedsReview,
    /// Accepted as extracted.
    Confirmed,
    /// Accepted with operator corrections.
    Edited,
    /// Excluded from enrichment.
    Skipped,
}

impl ExtractionStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeedsReview => "needs_review",
            Self::Confirmed => "confirmed",
            Self::Edited => "edited",
            Self::Skipped => "skipped",
        }
    }

    /// All statuses, for status reporting.
    #[must_use]
    pub fn all() -> [Self; 4] {
        [Self::NeedsReview, Self::Confirmed, Self::Edited, Self::Skipped]
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExtractionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "needs_review" => Ok(Self::NeedsReview),
            "confirmed" => Ok(Self::Confirmed),
            "edited" => Ok(Self::Edited),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("invalid extraction status: {s}")),
        }
    }
}

/// An alternative (title, author) mention reported by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltMention {
    /// Alternative title.
    pub title: String,
    /// Alternative author, if any.
    pub author: Option<String>,
}

/// Sub-filter for review queries over `needs_review` extractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionFilter {
    /// No sub-filter.
    #[default]
    All,
    /// Low-confidence extractions only.
    Low,
    /// Medium-confidence extractions only.
    Medium,
    /// Extractions that carry alternative mentions.
    Alternatives,
}

/// One LLM-extraction result for a staged message.
#[derive(Debug, Clone, FromRow)]
pub struct StagedExtraction {
    /// Unique identifier.
    pub id: i64,
    /// Owning staged message (1:1).
    pub message_id: i64,
    /// Extracted candidate title.
    pub title: String,
    /// Extracted candidate author.
    pub author: Option<String>,
    /// Confidence level (stored as text, parsed via `confidence()`).
    #[sqlx(rename = "confidence")]
    pub confidence_str: String,
    /// Alternative mentions as a JSON array.
    pub alternatives: Option<String>,
    /// Current status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// When the row was created.
    pub created_at: String,
    /// When the row was last updated.
    pub updated_at: String,
}

impl StagedExtraction {
    /// Returns the parsed status enum, falling back to `NeedsReview`.
    #[must_use]
    pub fn status(&self) -> ExtractionStatus {
        self.status_str.parse().unwrap_or(ExtractionStatus::NeedsReview)
    }

    /// Returns the parsed confidence, falling back to `Low`.
    #[must_use]
    pub fn confidence(&self) -> Confidence {
        self.confidence_str.parse().unwrap_or(Confidence::Low)
    }

    /// Parses alternative mentions from the JSON column.
    ///
    /// Returns an empty vector when absent or invalid.
    #[must_use]
    pub fn parse_alternatives(&self) -> Vec<AltMention> {
        let Some(json) = &self.alternatives else {
            return Vec::new();
        };
        serde_json::from_str(json).unwrap_or_default()
    }

    /// Serializes alternatives for storage; empty lists store as NULL.
    #[must_use]
    pub fn serialize_alternatives(alternatives: &[AltMention]) -> Option<String> {
        if alternatives.is_empty() {
            return None;
        }
        serde_json::to_string(alternatives).ok()
    }
}

/// Insert payload for a new staged extraction.
#[derive(Debug, Clone)]
pub struct NewStagedExtraction<'a> {
    /// Owning staged message.
    pub message_id: i64,
    /// Candidate title.
    pub title: &'a str,
    /// Candidate author.
    pub author: Option<&'a str>,
    /// Extractor confidence.
    pub confidence: Confidence,
    /// Alternative mentions.
    pub alternatives: &'a [AltMention],
    /// Initial status (`needs_review`, or `confirmed` under auto-confirm).
    pub status: ExtractionStatus,
}

impl PipelineStore {
    /// Inserts an extraction result for a staged message.
    ///
    /// # Errors
    ///
    /// Returns a constraint-classified [`StoreError`] when the message
    /// already has an extraction (1:1 invariant).
    #[instrument(skip(self, extraction), fields(message_id = extraction.message_id, title = %extraction.title))]
    pub async fn insert_extraction(&self, extraction: &NewStagedExtraction<'_>) -> Result<i64> {
        let alternatives_json = StagedExtraction::serialize_alternatives(extraction.alternatives);

        let result = sqlx::query(
            r"INSERT INTO staged_extractions (
                message_id,
                title,
                author,
                confidence,
                alternatives,
                status
              )
              VALUES (?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(extraction.message_id)
        .bind(extraction.title)
        .bind(extraction.author)
        .bind(extraction.confidence.as_str())
        .bind(alternatives_json)
        .bind(extraction.status.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Gets an extraction by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_extraction(&self, id: i64) -> Result<Option<StagedExtraction>> {
        let extraction =
            sqlx::query_as::<_, StagedExtraction>(r"SELECT * FROM staged_extractions WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(extraction)
    }

    /// Returns extractions in a status, oldest first, with an optional
    /// review sub-filter and limit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_extractions_by_status(
        &self,
        status: ExtractionStatus,
        filter: ExtractionFilter,
        limit: Option<i64>,
    ) -> Result<Vec<StagedExtraction>> {
        let filter_sql = match filter {
            ExtractionFilter::All => "",
            ExtractionFilter::Low => "AND confidence = 'low'",
            ExtractionFilter::Medium => "AND confidence = 'medium'",
            ExtractionFilter::Alternatives => "AND alternatives IS NOT NULL",
        };

        let query = format!(
            r"SELECT * FROM staged_extractions
              WHERE status = ? {filter_sql}
              ORDER BY created_at ASC, id ASC
              LIMIT ?"
        );

        let extractions = sqlx::query_as::<_, StagedExtraction>(&query)
            .bind(status.as_str())
            .bind(limit.unwrap_or(i64::MAX))
            .fetch_all(self.db.pool())
            .await?;

        Ok(extractions)
    }

    /// Counts extractions by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_extractions_by_status(&self, status: ExtractionStatus) -> Result<i64> {
        let result =
            sqlx::query(r"SELECT COUNT(*) as count FROM staged_extractions WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(self.db.pool())
                .await?;

        Ok(result.get("count"))
    }

    /// Counts extractions in a status at a confidence level.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_extractions_by_confidence(
        &self,
        status: ExtractionStatus,
        confidence: Confidence,
    ) -> Result<i64> {
        let result = sqlx::query(
            r"SELECT COUNT(*) as count FROM staged_extractions
              WHERE status = ? AND confidence = ?",
        )
        .bind(status.as_str())
        .bind(confidence.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("count"))
    }

    /// Applies a validated status transition. For `Edit`, the corrected
    /// title/author are written in the same statement.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RowNotFound`] when the extraction is missing
    /// and [`StoreError::InvalidTransition`] when the state machine rejects
    /// the action.
    #[instrument(skip(self, edited), fields(action = action.as_str()))]
    pub async fn transition_extraction(
        &self,
        id: i64,
        action: ExtractionAction,
        edited: Option<(&str, Option<&str>)>,
    ) -> Result<ExtractionStatus> {
        let extraction = self
            .get_extraction(id)
            .await?
            .ok_or(StoreError::RowNotFound {
                entity: "staged extraction",
                id,
            })?;

        let current = extraction.status();
        let next = extraction_transition(current, action).ok_or(StoreError::InvalidTransition {
            entity: "staged extraction",
            from: current.as_str(),
            action: action.as_str(),
        })?;

        let (title, author) = match edited {
            Some((title, author)) => (title.to_string(), author.map(str::to_string)),
            None => (extraction.title.clone(), extraction.author.clone()),
        };

        let result = sqlx::query(
            r"UPDATE staged_extractions
              SET status = ?, title = ?, author = ?, updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(&title)
        .bind(&author)
        .bind(id)
        .bind(current.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected("staged extraction", id, result.rows_affected())?;
        Ok(next)
    }

    /// Returns confirmed/edited extractions that do not yet have an
    /// enrichment row, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_enrichable_extractions(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<StagedExtraction>> {
        let extractions = sqlx::query_as::<_, StagedExtraction>(
            r"SELECT e.* FROM staged_extractions e
              LEFT JOIN staged_enrichments n ON n.extraction_id = e.id
              WHERE e.status IN ('confirmed', 'edited') AND n.id IS NULL
              ORDER BY e.created_at ASC, e.id ASC
              LIMIT ?",
        )
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(self.db.pool())
        .await?;

        Ok(extractions)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::store::NewStagedMessage;

    async fn store_with_message() -> (PipelineStore, i64) {
        let db = Database::new_in_memory().await.unwrap();
        let store = PipelineStore::new(db);
        let message_id = store
            .insert_message(&NewStagedMessage {
                source_user_id: "user100",
                source_message_id: "42",
                display_name: None,
                text: "Loved The Hobbit #review",
                source_chat_id: "chat-1",
                observed_at: "2026-05-01T19:30:00",
            })
            .await
            .unwrap();
        (store, message_id)
    }

    fn new_extraction(message_id: i64) -> NewStagedExtraction<'static> {
        NewStagedExtraction {
            message_id,
            title: "The Hobbit",
            author: Some("Tolkien"),
            confidence: Confidence::High,
            alternatives: &[],
            status: ExtractionStatus::NeedsReview,
        }
    }

    // ==================== Enum Tests ====================

    #[test]
    fn test_confidence_round_trip() {
        for confidence in [Confidence::High, Confidence::Medium, Confidence::Low] {
            assert_eq!(
                confidence.as_str().parse::<Confidence>().unwrap(),
                confidence
            );
        }
    }

    #[test]
    fn test_extraction_status_round_trip() {
        for status in ExtractionStatus::all() {
            assert_eq!(status.as_str().parse::<ExtractionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_serialize_alternatives_empty_is_none() {
        assert!(StagedExtraction::serialize_alternatives(&[]).is_none());
    }

    #[test]
    fn test_alternatives_round_trip() {
        let alternatives = vec![AltMention {
            title: "Hobbit".to_string(),
            author: None,
        }];
        let json = StagedExtraction::serialize_alternatives(&alternatives).unwrap();
        let parsed: Vec<AltMention> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, alternatives);
    }

    // ==================== Store Tests ====================

    #[tokio::test]
    async fn test_insert_and_get_extraction() {
        let (store, message_id) = store_with_message().await;
        let id = store.insert_extraction(&new_extraction(message_id)).await.unwrap();

        let extraction = store.get_extraction(id).await.unwrap().unwrap();
        assert_eq!(extraction.message_id, message_id);
        assert_eq!(extraction.confidence(), Confidence::High);
        assert_eq!(extraction.status(), ExtractionStatus::NeedsReview);
    }

    #[tokio::test]
    async fn test_one_extraction_per_message() {
        let (store, message_id) = store_with_message().await;
        store.insert_extraction(&new_extraction(message_id)).await.unwrap();

        let error = store
            .insert_extraction(&new_extraction(message_id))
            .await
            .unwrap_err();
        assert!(error.is_constraint_violation(), "got: {error}");
    }

    #[tokio::test]
    async fn test_transition_extraction_confirm() {
        let (store, message_id) = store_with_message().await;
        let id = store.insert_extraction(&new_extraction(message_id)).await.unwrap();

        let next = store
            .transition_extraction(id, ExtractionAction::Confirm, None)
            .await
            .unwrap();
        assert_eq!(next, ExtractionStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_transition_extraction_edit_updates_fields() {
        let (store, message_id) = store_with_message().await;
        let id = store.insert_extraction(&new_extraction(message_id)).await.unwrap();

        store
            .transition_extraction(
                id,
                ExtractionAction::Edit,
                Some(("The Hobbit, or There and Back Again", Some("J. R. R. Tolkien"))),
            )
            .await
            .unwrap();

        let extraction = store.get_extraction(id).await.unwrap().unwrap();
        assert_eq!(extraction.status(), ExtractionStatus::Edited);
        assert_eq!(extraction.title, "The Hobbit, or There and Back Again");
        assert_eq!(extraction.author.as_deref(), Some("J. R. R. Tolkien"));
    }

    #[tokio::test]
    async fn test_transition_extraction_monotonic() {
        let (store, message_id) = store_with_message().await;
        let id = store.insert_extraction(&new_extraction(message_id)).await.unwrap();
        store
            .transition_extraction(id, ExtractionAction::Confirm, None)
            .await
            .unwrap();

        let error = store
            .transition_extraction(id, ExtractionAction::Skip, None)
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_list_extractions_confidence_filter() {
        let (store, message_id) = store_with_message().await;
        store
            .insert_extraction(&NewStagedExtraction {
                confidence: Confidence::Low,
                ..new_extraction(message_id)
            })
            .await
            .unwrap();

        let low = store
            .list_extractions_by_status(
                ExtractionStatus::NeedsReview,
                ExtractionFilter::Low,
                None,
            )
            .await
            .unwrap();
        assert_eq!(low.len(), 1);

        let medium = store
            .list_extractions_by_status(
                ExtractionStatus::NeedsReview,
                ExtractionFilter::Medium,
                None,
            )
            .await
            .unwrap();
        assert!(medium.is_empty());
    }

    #[tokio::test]
    async fn test_list_extractions_alternatives_filter() {
        let (store, message_id) = store_with_message().await;
        let alternatives = vec![AltMention {
            title: "Hobbit".to_string(),
            author: None,
        }];
        store
            .insert_extraction(&NewStagedExtraction {
                alternatives: &alternatives,
                ..new_extraction(message_id)
            })
            .await
            .unwrap();

        let with_alternatives = store
            .list_extractions_by_status(
                ExtractionStatus::NeedsReview,
                ExtractionFilter::Alternatives,
                None,
            )
            .await
            .unwrap();
        assert_eq!(with_alternatives.len(), 1);
        assert_eq!(with_alternatives[0].parse_alternatives(), alternatives);
    }

    #[tokio::test]
    async fn test_count_extractions_by_confidence() {
        let (store, message_id) = store_with_message().await;
        store
            .insert_extraction(&NewStagedExtraction {
                confidence: Confidence::Medium,
                ..new_extraction(message_id)
            })
            .await
            .unwrap();

        assert_eq!(
            store
                .count_extractions_by_confidence(ExtractionStatus::NeedsReview, Confidence::Medium)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .count_extractions_by_confidence(ExtractionStatus::NeedsReview, Confidence::Low)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_list_enrichable_excludes_enriched_and_unconfirmed() {
        let (store, message_id) = store_with_message().await;
        let id = store.insert_extraction(&new_extraction(message_id)).await.unwrap();

        // needs_review rows are not enrichable
        assert!(store.list_enrichable_extractions(None).await.unwrap().is_empty());

        store
            .transition_extraction(id, ExtractionAction::Confirm, None)
            .await
            .unwrap();
        assert_eq!(store.list_enrichable_extractions(None).await.unwrap().len(), 1);
    }
}
