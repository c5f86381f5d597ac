//! Staged enrichment rows - matching attempts awaiting selection and
//! finalization.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row};
use tracing::instrument;

use crate::metadata::VolumeRecord;

use super::transitions::{EnrichmentAction, enrichment_transition};
use super::{PipelineStore, Result, StoreError, check_affected};

/// Status of a staged enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Waiting for a human (or auto) selection.
    NeedsSelection,
    /// A candidate match was chosen.
    Selected,
    /// Resolved through an operator ISBN lookup.
    IsbnEntered,
    /// Typed in by hand with a placeholder external id.
    ManualEntry,
    /// Permanently excluded from finalization.
    Skipped,
}

impl EnrichmentStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeedsSelection => "needs_selection",
            Self::Selected => "selected",
            Self::IsbnEntered => "isbn_entered",
            Self::ManualEntry => "manual_entry",
            Self::Skipped => "skipped",
        }
    }

    /// All statuses, for status reporting.
    #[must_use]
    pub fn all() -> [Self; 5] {
        [
            Self::NeedsSelection,
            Self::Selected,
            Self::IsbnEntered,
            Self::ManualEntry,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "needs_selection" => Ok(Self::NeedsSelection),
            "selected" => Ok(Self::Selected),
            "isbn_entered" => Ok(Self::IsbnEntered),
            "manual_entry" => Ok(Self::ManualEntry),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("invalid enrichment status: {s}")),
        }
    }
}

/// Sub-filter for selection-review queries over `needs_selection` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichmentFilter {
    /// No sub-filter.
    #[default]
    All,
    /// Rows with more than one candidate match.
    Multiple,
    /// Rows with no candidate match at all.
    NoResults,
    /// Rows whose chosen candidate has missing cover or metadata.
    Quality,
}

/// One matching attempt for a staged extraction.
#[derive(Debug, Clone, FromRow)]
pub struct StagedEnrichment {
    /// Unique identifier.
    pub id: i64,
    /// Owning staged extraction (1:1).
    pub extraction_id: i64,
    /// Title the matcher searched with.
    pub search_title: String,
    /// Author the matcher searched with.
    pub search_author: Option<String>,
    /// Candidate matches as a JSON array of volume records.
    pub candidates: Option<String>,
    /// More than one candidate was found.
    pub has_multiple_results: bool,
    /// No candidate was found.
    pub has_no_results: bool,
    /// Chosen/auto-selected record lacks a cover URL.
    pub missing_cover: bool,
    /// Chosen/auto-selected record lacks core metadata.
    pub missing_metadata: bool,
    /// External id of the chosen record.
    pub chosen_volume_id: Option<String>,
    /// Chosen record as a JSON payload.
    pub chosen_payload: Option<String>,
    /// Operator-entered ISBN when the override flow was used.
    pub entered_isbn: Option<String>,
    /// Catalog book, stamped exactly once by finalization.
    pub book_id: Option<i64>,
    /// Current status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Creation timestamp; doubles as the postponement clock.
    pub created_at: String,
    /// When the row was last updated.
    pub updated_at: String,
}

impl StagedEnrichment {
    /// Returns the parsed status enum, falling back to `NeedsSelection`.
    #[must_use]
    pub fn status(&self) -> EnrichmentStatus {
        self.status_str
            .parse()
            .unwrap_or(EnrichmentStatus::NeedsSelection)
    }

    /// Parses the candidate list from the JSON column.
    ///
    /// Returns an empty vector when absent or invalid.
    #[must_use]
    pub fn parse_candidates(&self) -> Vec<VolumeRecord> {
        let Some(json) = &self.candidates else {
            return Vec::new();
        };
        serde_json::from_str(json).unwrap_or_default()
    }

    /// Parses the chosen record payload, when present.
    #[must_use]
    pub fn chosen_record(&self) -> Option<VolumeRecord> {
        let json = self.chosen_payload.as_deref()?;
        serde_json::from_str(json).ok()
    }
}

/// Insert payload for a new staged enrichment.
#[derive(Debug, Clone)]
pub struct NewStagedEnrichment<'a> {
    /// Owning staged extraction.
    pub extraction_id: i64,
    /// Title the matcher searched with.
    pub search_title: &'a str,
    /// Author the matcher searched with.
    pub search_author: Option<&'a str>,
    /// Candidate matches found.
    pub candidates: &'a [VolumeRecord],
    /// Auto-selected record when exactly one candidate qualified.
    pub auto_selected: Option<&'a VolumeRecord>,
}

impl PipelineStore {
    /// Inserts a matching attempt for an extraction.
    ///
    /// Pool-derived flags are computed here: `has_no_results` /
    /// `has_multiple_results` from the candidate count, the quality flags
    /// from the auto-selected record when there is one. An auto-selected
    /// row is born `selected`; everything else starts `needs_selection`.
    ///
    /// # Errors
    ///
    /// Returns a constraint-classified [`StoreError`] when the extraction
    /// already has an enrichment (1:1 invariant).
    #[instrument(skip(self, enrichment), fields(extraction_id = enrichment.extraction_id, title = %enrichment.search_title))]
    pub async fn insert_enrichment(&self, enrichment: &NewStagedEnrichment<'_>) -> Result<i64> {
        let candidates_json = if enrichment.candidates.is_empty() {
            None
        } else {
            Some(serde_json::to_string(enrichment.candidates)?)
        };

        let (status, chosen_volume_id, chosen_payload) = match enrichment.auto_selected {
            Some(record) => (
                EnrichmentStatus::Selected,
                Some(record.volume_id.clone()),
                Some(serde_json::to_string(record)?),
            ),
            None => (EnrichmentStatus::NeedsSelection, None, None),
        };

        let missing_cover = enrichment
            .auto_selected
            .is_some_and(VolumeRecord::missing_cover);
        let missing_metadata = enrichment
            .auto_selected
            .is_some_and(VolumeRecord::missing_metadata);

        let result = sqlx::query(
            r"INSERT INTO staged_enrichments (
                extraction_id,
                search_title,
                search_author,
                candidates,
                has_multiple_results,
                has_no_results,
                missing_cover,
                missing_metadata,
                chosen_volume_id,
                chosen_payload,
                status
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(enrichment.extraction_id)
        .bind(enrichment.search_title)
        .bind(enrichment.search_author)
        .bind(candidates_json)
        .bind(enrichment.candidates.len() > 1)
        .bind(enrichment.candidates.is_empty())
        .bind(missing_cover)
        .bind(missing_metadata)
        .bind(chosen_volume_id)
        .bind(chosen_payload)
        .bind(status.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Gets an enrichment by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_enrichment(&self, id: i64) -> Result<Option<StagedEnrichment>> {
        let enrichment =
            sqlx::query_as::<_, StagedEnrichment>(r"SELECT * FROM staged_enrichments WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(enrichment)
    }

    /// Returns `needs_selection` rows, oldest first, with an optional
    /// sub-filter. Postponed rows sort to the back because postponement
    /// rewrites `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_needs_selection(
        &self,
        filter: EnrichmentFilter,
        limit: Option<i64>,
    ) -> Result<Vec<StagedEnrichment>> {
        let filter_sql = match filter {
            EnrichmentFilter::All => "",
            EnrichmentFilter::Multiple => "AND has_multiple_results = 1",
            EnrichmentFilter::NoResults => "AND has_no_results = 1",
            EnrichmentFilter::Quality => "AND (missing_cover = 1 OR missing_metadata = 1)",
        };

        let query = format!(
            r"SELECT * FROM staged_enrichments
              WHERE status = 'needs_selection' {filter_sql}
              ORDER BY created_at ASC, id ASC
              LIMIT ?"
        );

        let enrichments = sqlx::query_as::<_, StagedEnrichment>(&query)
            .bind(limit.unwrap_or(i64::MAX))
            .fetch_all(self.db.pool())
            .await?;

        Ok(enrichments)
    }

    /// Marks a candidate as selected, storing its id and payload.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] unless the row is in
    /// `needs_selection`.
    #[instrument(skip(self, record), fields(volume_id = %record.volume_id))]
    pub async fn select_candidate(&self, id: i64, record: &VolumeRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.apply_selection(
            id,
            EnrichmentAction::Select,
            Some(&record.volume_id),
            Some(&payload),
            None,
            record,
        )
        .await
    }

    /// Records an ISBN-override resolution.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] unless the row is in
    /// `needs_selection`.
    #[instrument(skip(self, record), fields(isbn = %isbn))]
    pub async fn record_isbn_entry(
        &self,
        id: i64,
        isbn: &str,
        record: &VolumeRecord,
    ) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.apply_selection(
            id,
            EnrichmentAction::EnterIsbn,
            Some(&record.volume_id),
            Some(&payload),
            Some(isbn),
            record,
        )
        .await
    }

    /// Records a manual entry with its placeholder external id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] unless the row is in
    /// `needs_selection`.
    #[instrument(skip(self, record), fields(volume_id = %record.volume_id))]
    pub async fn record_manual_entry(&self, id: i64, record: &VolumeRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.apply_selection(
            id,
            EnrichmentAction::ManualEntry,
            Some(&record.volume_id),
            Some(&payload),
            None,
            record,
        )
        .await
    }

    /// Permanently excludes an enrichment from finalization.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] unless the row is in
    /// `needs_selection`.
    #[instrument(skip(self))]
    pub async fn skip_enrichment(&self, id: i64) -> Result<()> {
        let enrichment = self.get_enrichment(id).await?.ok_or(StoreError::RowNotFound {
            entity: "staged enrichment",
            id,
        })?;
        let current = enrichment.status();
        let next = enrichment_transition(current, EnrichmentAction::Skip).ok_or(
            StoreError::InvalidTransition {
                entity: "staged enrichment",
                from: current.as_str(),
                action: EnrichmentAction::Skip.as_str(),
            },
        )?;

        let result = sqlx::query(
            r"UPDATE staged_enrichments
              SET status = ?, updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(id)
        .bind(current.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected("staged enrichment", id, result.rows_affected())
    }

    /// Pushes a row to the back of the oldest-first selection queue by
    /// resetting its creation timestamp. Status is unchanged.
    ///
    /// Sub-second precision keeps the postponed row behind rows created in
    /// the same second.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RowNotFound`] if no `needs_selection` row has
    /// the given ID.
    #[instrument(skip(self))]
    pub async fn postpone_enrichment(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE staged_enrichments
              SET created_at = strftime('%Y-%m-%d %H:%M:%f', 'now'),
                  updated_at = datetime('now')
              WHERE id = ? AND status = 'needs_selection'",
        )
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected("staged enrichment", id, result.rows_affected())
    }

    /// Returns rows ready for finalization: resolved status, no book yet,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_finalizable_enrichments(&self) -> Result<Vec<StagedEnrichment>> {
        let enrichments = sqlx::query_as::<_, StagedEnrichment>(
            r"SELECT * FROM staged_enrichments
              WHERE status IN ('selected', 'isbn_entered', 'manual_entry')
                AND book_id IS NULL
              ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(enrichments)
    }

    /// Stamps the resolved catalog book onto an enrichment, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RowNotFound`] when the row is missing, already
    /// stamped, or not in a finalizable status.
    #[instrument(skip(self))]
    pub async fn stamp_enrichment_book(&self, id: i64, book_id: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE staged_enrichments
              SET book_id = ?, updated_at = datetime('now')
              WHERE id = ?
                AND book_id IS NULL
                AND status IN ('selected', 'isbn_entered', 'manual_entry')",
        )
        .bind(book_id)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected("staged enrichment", id, result.rows_affected())
    }

    /// Counts enrichments by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_enrichments_by_status(&self, status: EnrichmentStatus) -> Result<i64> {
        let result =
            sqlx::query(r"SELECT COUNT(*) as count FROM staged_enrichments WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(self.db.pool())
                .await?;

        Ok(result.get("count"))
    }

    /// Counts `needs_selection` rows matching a sub-filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_needs_selection(&self, filter: EnrichmentFilter) -> Result<i64> {
        Ok(self.list_needs_selection(filter, None).await?.len() as i64)
    }

    async fn apply_selection(
        &self,
        id: i64,
        action: EnrichmentAction,
        chosen_volume_id: Option<&str>,
        chosen_payload: Option<&str>,
        entered_isbn: Option<&str>,
        record: &VolumeRecord,
    ) -> Result<()> {
        let enrichment = self.get_enrichment(id).await?.ok_or(StoreError::RowNotFound {
            entity: "staged enrichment",
            id,
        })?;
        let current = enrichment.status();
        let next = enrichment_transition(current, action).ok_or(StoreError::InvalidTransition {
            entity: "staged enrichment",
            from: current.as_str(),
            action: action.as_str(),
        })?;

        let result = sqlx::query(
            r"UPDATE staged_enrichments
              SET status = ?,
                  chosen_volume_id = ?,
                  chosen_payload = ?,
                  entered_isbn = ?,
                  missing_cover = ?,
                  missing_metadata = ?,
                  updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(chosen_volume_id)
        .bind(chosen_payload)
        .bind(entered_isbn)
        .bind(record.missing_cover())
        .bind(record.missing_metadata())
        .bind(id)
        .bind(current.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected("staged enrichment", id, result.rows_affected())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::store::{
        Confidence, ExtractionStatus, NewStagedExtraction, NewStagedMessage,
    };

    fn record(volume_id: &str, title: &str) -> VolumeRecord {
        VolumeRecord {
            volume_id: volume_id.to_string(),
            title: title.to_string(),
            author: Some("Tolkien".to_string()),
            description: Some("There and back again.".to_string()),
            genres: vec!["Fantasy".to_string()],
            published_year: Some(1937),
            cover_url: Some("https://covers.example/hobbit.jpg".to_string()),
            isbn: Some("9780261103283".to_string()),
            page_count: Some(310),
        }
    }

    async fn store_with_extraction() -> (PipelineStore, i64) {
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
        let extraction_id = store
            .insert_extraction(&NewStagedExtraction {
                message_id,
                title: "The Hobbit",
                author: Some("Tolkien"),
                confidence: Confidence::High,
                alternatives: &[],
                status: ExtractionStatus::Confirmed,
            })
            .await
            .unwrap();
        (store, extraction_id)
    }

    fn needs_selection(extraction_id: i64, candidates: &[VolumeRecord]) -> NewStagedEnrichment<'_> {
        NewStagedEnrichment {
            extraction_id,
            search_title: "The Hobbit",
            search_author: Some("Tolkien"),
            candidates,
            auto_selected: None,
        }
    }

    // ==================== Insert & Flag Tests ====================

    #[tokio::test]
    async fn test_insert_enrichment_no_results_flag() {
        let (store, extraction_id) = store_with_extraction().await;
        let id = store
            .insert_enrichment(&needs_selection(extraction_id, &[]))
            .await
            .unwrap();

        let row = store.get_enrichment(id).await.unwrap().unwrap();
        assert!(row.has_no_results);
        assert!(!row.has_multiple_results);
        assert_eq!(row.status(), EnrichmentStatus::NeedsSelection);
        assert!(row.parse_candidates().is_empty());
    }

    #[tokio::test]
    async fn test_insert_enrichment_multiple_results_flag() {
        let (store, extraction_id) = store_with_extraction().await;
        let candidates = vec![record("v1", "The Hobbit"), record("v2", "The Hobbit Annotated")];
        let id = store
            .insert_enrichment(&needs_selection(extraction_id, &candidates))
            .await
            .unwrap();

        let row = store.get_enrichment(id).await.unwrap().unwrap();
        assert!(row.has_multiple_results);
        assert!(!row.has_no_results);
        assert_eq!(row.parse_candidates().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_enrichment_auto_selected() {
        let (store, extraction_id) = store_with_extraction().await;
        let candidates = vec![record("v1", "The Hobbit")];
        let id = store
            .insert_enrichment(&NewStagedEnrichment {
                auto_selected: Some(&candidates[0]),
                ..needs_selection(extraction_id, &candidates)
            })
            .await
            .unwrap();

        let row = store.get_enrichment(id).await.unwrap().unwrap();
        assert_eq!(row.status(), EnrichmentStatus::Selected);
        assert_eq!(row.chosen_volume_id.as_deref(), Some("v1"));
        assert_eq!(row.chosen_record().unwrap().title, "The Hobbit");
        assert!(!row.missing_cover);
    }

    #[tokio::test]
    async fn test_insert_enrichment_quality_flags_from_auto_selected() {
        let (store, extraction_id) = store_with_extraction().await;
        let mut bare = record("v1", "The Hobbit");
        bare.cover_url = None;
        bare.description = None;
        let candidates = vec![bare.clone()];

        let id = store
            .insert_enrichment(&NewStagedEnrichment {
                auto_selected: Some(&bare),
                ..needs_selection(extraction_id, &candidates)
            })
            .await
            .unwrap();

        let row = store.get_enrichment(id).await.unwrap().unwrap();
        assert!(row.missing_cover);
        assert!(row.missing_metadata);
    }

    #[tokio::test]
    async fn test_one_enrichment_per_extraction() {
        let (store, extraction_id) = store_with_extraction().await;
        store
            .insert_enrichment(&needs_selection(extraction_id, &[]))
            .await
            .unwrap();

        let error = store
            .insert_enrichment(&needs_selection(extraction_id, &[]))
            .await
            .unwrap_err();
        assert!(error.is_constraint_violation(), "got: {error}");
    }

    // ==================== Selection Tests ====================

    #[tokio::test]
    async fn test_select_candidate() {
        let (store, extraction_id) = store_with_extraction().await;
        let candidates = vec![record("v1", "The Hobbit"), record("v2", "Other")];
        let id = store
            .insert_enrichment(&needs_selection(extraction_id, &candidates))
            .await
            .unwrap();

        store.select_candidate(id, &candidates[1]).await.unwrap();

        let row = store.get_enrichment(id).await.unwrap().unwrap();
        assert_eq!(row.status(), EnrichmentStatus::Selected);
        assert_eq!(row.chosen_volume_id.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_record_isbn_entry() {
        let (store, extraction_id) = store_with_extraction().await;
        let id = store
            .insert_enrichment(&needs_selection(extraction_id, &[]))
            .await
            .unwrap();

        let hit = record("v9", "The Hobbit");
        store.record_isbn_entry(id, "9780261103283", &hit).await.unwrap();

        let row = store.get_enrichment(id).await.unwrap().unwrap();
        assert_eq!(row.status(), EnrichmentStatus::IsbnEntered);
        assert_eq!(row.entered_isbn.as_deref(), Some("9780261103283"));
        assert_eq!(row.chosen_volume_id.as_deref(), Some("v9"));
    }

    #[tokio::test]
    async fn test_selection_rejected_after_terminal_status() {
        let (store, extraction_id) = store_with_extraction().await;
        let candidates = vec![record("v1", "The Hobbit")];
        let id = store
            .insert_enrichment(&needs_selection(extraction_id, &candidates))
            .await
            .unwrap();

        store.skip_enrichment(id).await.unwrap();
        let error = store.select_candidate(id, &candidates[0]).await.unwrap_err();
        assert!(matches!(error, StoreError::InvalidTransition { .. }));
    }

    // ==================== Postpone & Queue Tests ====================

    #[tokio::test]
    async fn test_postpone_moves_row_to_back() {
        let db = Database::new_in_memory().await.unwrap();
        let store = PipelineStore::new(db);

        let mut ids = Vec::new();
        for n in 0..2 {
            let message_id = store
                .insert_message(&NewStagedMessage {
                    source_user_id: "user100",
                    source_message_id: &format!("m{n}"),
                    display_name: None,
                    text: "text #review",
                    source_chat_id: "chat-1",
                    observed_at: "2026-05-01T19:30:00",
                })
                .await
                .unwrap();
            let extraction_id = store
                .insert_extraction(&NewStagedExtraction {
                    message_id,
                    title: "The Hobbit",
                    author: None,
                    confidence: Confidence::High,
                    alternatives: &[],
                    status: ExtractionStatus::Confirmed,
                })
                .await
                .unwrap();
            let id = store
                .insert_enrichment(&needs_selection(extraction_id, &[]))
                .await
                .unwrap();
            ids.push(id);
        }

        store.postpone_enrichment(ids[0]).await.unwrap();

        let queue = store
            .list_needs_selection(EnrichmentFilter::All, None)
            .await
            .unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].id, ids[1], "postponed row must sort last");
        assert_eq!(queue[1].id, ids[0]);

        // Status is unchanged by postponement
        assert_eq!(queue[1].status(), EnrichmentStatus::NeedsSelection);
    }

    #[tokio::test]
    async fn test_postpone_requires_needs_selection() {
        let (store, extraction_id) = store_with_extraction().await;
        let id = store
            .insert_enrichment(&needs_selection(extraction_id, &[]))
            .await
            .unwrap();
        store.skip_enrichment(id).await.unwrap();

        let error = store.postpone_enrichment(id).await.unwrap_err();
        assert!(matches!(error, StoreError::RowNotFound { .. }));
    }

    // ==================== Finalization Support Tests ====================

    #[tokio::test]
    async fn test_list_finalizable_and_stamp_book() {
        let (store, extraction_id) = store_with_extraction().await;
        let candidates = vec![record("v1", "The Hobbit")];
        let id = store
            .insert_enrichment(&NewStagedEnrichment {
                auto_selected: Some(&candidates[0]),
                ..needs_selection(extraction_id, &candidates)
            })
            .await
            .unwrap();

        let finalizable = store.list_finalizable_enrichments().await.unwrap();
        assert_eq!(finalizable.len(), 1);
        assert_eq!(finalizable[0].id, id);

        store.stamp_enrichment_book(id, 7).await.unwrap();
        assert!(store.list_finalizable_enrichments().await.unwrap().is_empty());

        // bookId is set exactly once
        let error = store.stamp_enrichment_book(id, 8).await.unwrap_err();
        assert!(matches!(error, StoreError::RowNotFound { .. }));

        let row = store.get_enrichment(id).await.unwrap().unwrap();
        assert_eq!(row.book_id, Some(7));
    }

    #[tokio::test]
    async fn test_skipped_rows_never_finalizable() {
        let (store, extraction_id) = store_with_extraction().await;
        let id = store
            .insert_enrichment(&needs_selection(extraction_id, &[]))
            .await
            .unwrap();
        store.skip_enrichment(id).await.unwrap();

        assert!(store.list_finalizable_enrichments().await.unwrap().is_empty());
        let error = store.stamp_enrichment_book(id, 1).await.unwrap_err();
        assert!(matches!(error, StoreError::RowNotFound { .. }));
    }

    // ==================== Filter Count Tests ====================

    #[tokio::test]
    async fn test_count_needs_selection_filters() {
        let (store, extraction_id) = store_with_extraction().await;
        store
            .insert_enrichment(&needs_selection(extraction_id, &[]))
            .await
            .unwrap();

        assert_eq!(
            store.count_needs_selection(EnrichmentFilter::NoResults).await.unwrap(),
            1
        );
        assert_eq!(
            store.count_needs_selection(EnrichmentFilter::Multiple).await.unwrap(),
            0
        );
        assert_eq!(
            store.count_needs_selection(EnrichmentFilter::All).await.unwrap(),
            1
        );
    }
}
