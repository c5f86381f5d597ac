//! Finalization stage - converts approved enrichments into catalog books
//! and reviews.
//!
//! Resolution order per row: in-run cache, exact external-id match, fuzzy
//! local-catalog match, create. The in-run cache is scoped to one
//! invocation so multiple reviews of the same work inside a batch share
//! one book without promoting the cache to global state. Dry-run performs
//! identical resolution against real catalog state with zero writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::matching::{MatchError, MatchingEngine};
use crate::store::{NewBook, NewReview, PipelineStore, StagedEnrichment, StoreError};

/// Opaque text-to-label sentiment function (external collaborator).
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Classifies one review text; `None` when no label is available.
    async fn classify(&self, text: &str) -> Option<String>;
}

/// Default classifier for deployments without a sentiment model wired in.
#[derive(Debug, Default, Clone)]
pub struct UnlabeledSentiment;

#[async_trait]
impl SentimentClassifier for UnlabeledSentiment {
    async fn classify(&self, _text: &str) -> Option<String> {
        None
    }
}

/// How a chosen record resolved against the catalog within one run.
///
/// `WouldCreate` carries a run-local temp key so dry-run summaries can
/// count distinct would-be books without overloading real identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// An existing catalog book (or one created earlier in this run).
    Existing(i64),
    /// Dry-run placeholder for a book this run would create.
    WouldCreate(u64),
}

/// Errors produced while finalizing one enrichment.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Fuzzy catalog matching failed.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Required staged data is missing; the row is left for inspection.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Counters reported by one finalize run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Enrichments examined.
    pub processed: u32,
    /// Catalog books created (or that would be, in dry-run).
    pub books_created: u32,
    /// Rows resolved to an already-known book.
    pub books_reused: u32,
    /// Reviews created (or that would be, in dry-run).
    pub reviews_created: u32,
    /// Rows that failed and were left for inspection.
    pub errors: u32,
}

/// Finalization stage.
pub struct FinalizeStage {
    store: PipelineStore,
    engine: MatchingEngine,
    classifier: Arc<dyn SentimentClassifier>,
    dry_run: bool,
}

impl FinalizeStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        store: PipelineStore,
        engine: MatchingEngine,
        classifier: Arc<dyn SentimentClassifier>,
    ) -> Self {
        Self {
            store,
            engine,
            classifier,
            dry_run: false,
        }
    }

    /// Performs identical resolution with zero writes.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Finalizes all resolved enrichments without a book, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only for failures listing the work queue;
    /// per-row errors are counted and the batch continues.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn run(&self) -> Result<FinalizeReport, StoreError> {
        let rows = self.store.list_finalizable_enrichments().await?;

        let mut report = FinalizeReport::default();
        // In-run cache: external id -> resolution. Never outlives this
        // invocation.
        let mut cache: HashMap<String, Resolution> = HashMap::new();
        let mut next_temp_key: u64 = 1;

        for row in rows {
            report.processed += 1;
            match self
                .finalize_row(&row, &mut cache, &mut next_temp_key, &mut report)
                .await
            {
                Ok(()) => {}
                Err(error) => {
                    warn!(enrichment_id = row.id, error = %error, "finalization failed, row left for inspection");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    async fn finalize_row(
        &self,
        row: &StagedEnrichment,
        cache: &mut HashMap<String, Resolution>,
        next_temp_key: &mut u64,
        report: &mut FinalizeReport,
    ) -> Result<(), FinalizeError> {
        let chosen = row.chosen_record().ok_or_else(|| {
            FinalizeError::Invariant(format!("enrichment {} has no chosen book payload", row.id))
        })?;

        let extraction = self
            .store
            .get_extraction(row.extraction_id)
            .await?
            .ok_or_else(|| {
                FinalizeError::Invariant(format!(
                    "enrichment {} has no staged extraction",
                    row.id
                ))
            })?;
        let message = self
            .store
            .get_message(extraction.message_id)
            .await?
            .ok_or_else(|| {
                FinalizeError::Invariant(format!(
                    "enrichment {} has no source message",
                    row.id
                ))
            })?;

        // Resolution order: cache, exact external id, fuzzy local, create.
        let resolution = if let Some(resolution) = cache.get(&chosen.volume_id) {
            report.books_reused += 1;
            *resolution
        } else if let Some(book) = self.store.find_book_by_volume_id(&chosen.volume_id).await? {
            report.books_reused += 1;
            let resolution = Resolution::Existing(book.id);
            cache.insert(chosen.volume_id.clone(), resolution);
            resolution
        } else if let Some(matched) = self
            .engine
            .search_local_catalog(&chosen.title, chosen.author.as_deref())
            .await?
            .into_iter()
            .next()
        {
            report.books_reused += 1;
            let resolution = Resolution::Existing(matched.book.id);
            cache.insert(chosen.volume_id.clone(), resolution);
            resolution
        } else {
            report.books_created += 1;
            let resolution = if self.dry_run {
                let temp_key = *next_temp_key;
                *next_temp_key += 1;
                Resolution::WouldCreate(temp_key)
            } else {
                let book_id = self.store.insert_book(&NewBook::from_record(&chosen)).await?;
                Resolution::Existing(book_id)
            };
            cache.insert(chosen.volume_id.clone(), resolution);
            resolution
        };

        debug!(enrichment_id = row.id, ?resolution, "resolved");

        if self.dry_run {
            report.reviews_created += 1;
            return Ok(());
        }

        let Resolution::Existing(book_id) = resolution else {
            // WouldCreate never escapes dry-run
            return Err(FinalizeError::Invariant(format!(
                "enrichment {} resolved to a dry-run placeholder in a live run",
                row.id
            )));
        };

        let sentiment = self.classifier.classify(&message.text).await;
        self.store
            .insert_review(&NewReview {
                book_id: Some(book_id),
                source_user_id: &message.source_user_id,
                source_message_id: &message.source_message_id,
                text: &message.text,
                sentiment: sentiment.as_deref(),
                reviewed_at: &message.observed_at,
            })
            .await?;
        report.reviews_created += 1;

        self.store.stamp_enrichment_book(row.id, book_id).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::metadata::{MetadataError, MetadataSource, VolumeRecord};
    use crate::store::{
        Confidence, ExtractionStatus, NewStagedEnrichment, NewStagedExtraction, NewStagedMessage,
    };

    struct NoSource;

    #[async_trait]
    impl MetadataSource for NoSource {
        async fn search_by_query(
            &self,
            _query: &str,
            _max_results: u32,
        ) -> Result<Vec<VolumeRecord>, MetadataError> {
            Ok(Vec::new())
        }

        async fn get_by_id(&self, _id: &str) -> Result<Option<VolumeRecord>, MetadataError> {
            Ok(None)
        }
    }

    struct FixedSentiment;

    #[async_trait]
    impl SentimentClassifier for FixedSentiment {
        async fn classify(&self, _text: &str) -> Option<String> {
            Some("positive".to_string())
        }
    }

    fn record(volume_id: &str, title: &str) -> VolumeRecord {
        VolumeRecord {
            volume_id: volume_id.to_string(),
            title: title.to_string(),
            author: Some("Tolkien".to_string()),
            description: None,
            genres: Vec::new(),
            published_year: Some(1937),
            cover_url: None,
            isbn: None,
            page_count: None,
        }
    }

    async fn store() -> PipelineStore {
        let db = Database::new_in_memory().await.unwrap();
        PipelineStore::new(db)
    }

    /// Stages one selected enrichment for the given record and message id.
    async fn selected_enrichment(store: &PipelineStore, n: u32, chosen: &VolumeRecord) -> i64 {
        let message_id = store
            .insert_message(&NewStagedMessage {
                source_user_id: "user100",
                source_message_id: &format!("{n}"),
                display_name: None,
                text: "Loved it #review",
                source_chat_id: "chat-1",
                observed_at: "2026-05-01T19:30:00",
            })
            .await
            .unwrap();
        let extraction_id = store
            .insert_extraction(&NewStagedExtraction {
                message_id,
                title: &chosen.title,
                author: chosen.author.as_deref(),
                confidence: Confidence::High,
                alternatives: &[],
                status: ExtractionStatus::Confirmed,
            })
            .await
            .unwrap();
        let candidates = vec![chosen.clone()];
        store
            .insert_enrichment(&NewStagedEnrichment {
                extraction_id,
                search_title: &chosen.title,
                search_author: chosen.author.as_deref(),
                candidates: &candidates,
                auto_selected: Some(chosen),
            })
            .await
            .unwrap()
    }

    fn stage_for(store: &PipelineStore) -> FinalizeStage {
        let engine = MatchingEngine::new(store.clone(), Arc::new(NoSource));
        FinalizeStage::new(store.clone(), engine, Arc::new(FixedSentiment))
    }

    #[tokio::test]
    async fn test_finalize_creates_book_and_review() {
        let store = store().await;
        let enrichment_id = selected_enrichment(&store, 1, &record("v1", "The Hobbit")).await;

        let report = stage_for(&store).run().await.unwrap();
        assert_eq!(report.books_created, 1);
        assert_eq!(report.books_reused, 0);
        assert_eq!(report.reviews_created, 1);
        assert_eq!(report.errors, 0);

        let row = store.get_enrichment(enrichment_id).await.unwrap().unwrap();
        let book_id = row.book_id.unwrap();
        let book = store.get_book(book_id).await.unwrap().unwrap();
        assert_eq!(book.volume_id.as_deref(), Some("v1"));

        let reviews = store.reviews_for_book(book_id).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].sentiment.as_deref(), Some("positive"));
    }

    #[tokio::test]
    async fn test_finalize_same_volume_id_creates_one_book() {
        let store = store().await;
        let chosen = record("v1", "The Hobbit");
        selected_enrichment(&store, 1, &chosen).await;
        selected_enrichment(&store, 2, &chosen).await;

        let report = stage_for(&store).run().await.unwrap();
        assert_eq!(report.books_created, 1, "in-run cache must dedupe");
        assert_eq!(report.books_reused, 1);
        assert_eq!(report.reviews_created, 2);

        assert_eq!(store.count_books().await.unwrap(), 1);
        assert_eq!(store.count_reviews().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_finalize_reuses_existing_catalog_book() {
        let store = store().await;
        let chosen = record("v1", "The Hobbit");
        store
            .insert_book(&NewBook::from_record(&chosen))
            .await
            .unwrap();
        selected_enrichment(&store, 1, &chosen).await;

        let report = stage_for(&store).run().await.unwrap();
        assert_eq!(report.books_created, 0);
        assert_eq!(report.books_reused, 1);
        assert_eq!(store.count_books().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_finalize_fuzzy_matches_existing_book() {
        let store = store().await;
        // Catalog book under a different external id but the same work
        store
            .insert_book(&NewBook {
                title: "The Hobbit",
                author: Some("Tolkien"),
                volume_id: Some("other-provider-id"),
                cover_url: None,
                genres: &[],
                published_year: None,
                description: None,
                isbn: None,
                page_count: None,
            })
            .await
            .unwrap();
        selected_enrichment(&store, 1, &record("v1", "the hobbit!")).await;

        let report = stage_for(&store).run().await.unwrap();
        assert_eq!(report.books_created, 0);
        assert_eq!(report.books_reused, 1);
        assert_eq!(store.count_books().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_finalize_dry_run_parity_and_no_writes() {
        let store = store().await;
        let chosen = record("v1", "The Hobbit");
        selected_enrichment(&store, 1, &chosen).await;
        selected_enrichment(&store, 2, &chosen).await;
        selected_enrichment(&store, 3, &record("v2", "Dune")).await;

        let dry = stage_for(&store).with_dry_run(true).run().await.unwrap();
        assert_eq!(store.count_books().await.unwrap(), 0, "zero writes");
        assert_eq!(store.count_reviews().await.unwrap(), 0, "zero writes");
        assert_eq!(store.list_finalizable_enrichments().await.unwrap().len(), 3);

        let live = stage_for(&store).run().await.unwrap();
        assert_eq!(dry.books_created, live.books_created);
        assert_eq!(dry.books_reused, live.books_reused);
        assert_eq!(dry.reviews_created, live.reviews_created);
        assert_eq!(store.count_books().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_finalize_missing_payload_counts_error() {
        let store = store().await;
        let chosen = record("v1", "The Hobbit");
        let enrichment_id = selected_enrichment(&store, 1, &chosen).await;

        // Corrupt the payload to simulate an invariant violation
        sqlx::query("UPDATE staged_enrichments SET chosen_payload = NULL WHERE id = ?")
            .bind(enrichment_id)
            .execute(store.database().pool())
            .await
            .unwrap();

        let report = stage_for(&store).run().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(store.count_reviews().await.unwrap(), 0);

        // Row left for manual inspection
        let row = store.get_enrichment(enrichment_id).await.unwrap().unwrap();
        assert!(row.book_id.is_none());
    }

    #[tokio::test]
    async fn test_finalize_error_does_not_abort_batch() {
        let store = store().await;
        let bad = selected_enrichment(&store, 1, &record("v1", "The Hobbit")).await;
        selected_enrichment(&store, 2, &record("v2", "Dune")).await;

        sqlx::query("UPDATE staged_enrichments SET chosen_payload = NULL WHERE id = ?")
            .bind(bad)
            .execute(store.database().pool())
            .await
            .unwrap();

        let report = stage_for(&store).run().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.reviews_created, 1, "batch continues past errors");
    }
}
