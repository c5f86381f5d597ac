//! Enrichment stage - attaches candidate matches to confirmed extractions.
//!
//! Runs the matching engine for each confirmed or edited extraction that
//! has no enrichment yet. A single qualifying match is auto-selected;
//! multiple or zero matches stay in `needs_selection` with the flags the
//! review filters key on. Empty pools leave a durable evaluation case.

use chrono::Utc;
use tracing::{instrument, warn};

use crate::alert::{Clock, Notifier};
use crate::caselog::{EvaluationCase, EvaluationCaseLog};
use crate::matching::{MatchSource, MatchingEngine};
use crate::store::{NewStagedEnrichment, PipelineStore, StagedExtraction, StoreError};

/// Counters reported by one enrich run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    /// Extractions examined.
    pub processed: u32,
    /// Rows auto-selected (exactly one qualifying match).
    pub auto_selected: u32,
    /// Rows staged for human selection.
    pub needs_selection: u32,
    /// Rows with an empty candidate pool.
    pub no_results: u32,
    /// Extractions whose matching failed.
    pub errors: u32,
}

/// Enrichment stage.
pub struct EnrichStage<C: Clock + Clone> {
    store: PipelineStore,
    engine: MatchingEngine,
    caselog: EvaluationCaseLog<C>,
    notifier: std::sync::Arc<dyn Notifier>,
}

impl<C: Clock + Clone> EnrichStage<C> {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        store: PipelineStore,
        engine: MatchingEngine,
        caselog: EvaluationCaseLog<C>,
        notifier: std::sync::Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            engine,
            caselog,
            notifier,
        }
    }

    /// Enriches confirmed/edited extractions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only for failures listing the work queue;
    /// per-extraction failures (including rate-limit escalation) are
    /// counted and skipped.
    #[instrument(skip(self))]
    pub async fn run(&mut self, limit: Option<i64>) -> Result<EnrichReport, StoreError> {
        let extractions = self.store.list_enrichable_extractions(limit).await?;

        let mut report = EnrichReport::default();

        for extraction in extractions {
            report.processed += 1;
            if let Err(error) = self.enrich_one(&extraction, &mut report).await {
                warn!(extraction_id = extraction.id, error = %error, "enrichment failed");
                report.errors += 1;
            }
        }

        Ok(report)
    }

    async fn enrich_one(
        &mut self,
        extraction: &StagedExtraction,
        report: &mut EnrichReport,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let alternatives = extraction.parse_alternatives();
        let enriched = self
            .engine
            .enrich_book_info(&extraction.title, extraction.author.as_deref(), &alternatives)
            .await?;

        let auto_selected = if enriched.matches.len() == 1 {
            Some(&enriched.matches[0])
        } else {
            None
        };

        self.store
            .insert_enrichment(&NewStagedEnrichment {
                extraction_id: extraction.id,
                search_title: &extraction.title,
                search_author: extraction.author.as_deref(),
                candidates: &enriched.matches,
                auto_selected,
            })
            .await?;

        if auto_selected.is_some() {
            report.auto_selected += 1;
        } else {
            report.needs_selection += 1;
        }

        if enriched.source == MatchSource::None {
            report.no_results += 1;
            self.log_unmatched(extraction).await;
        }

        Ok(())
    }

    /// Records an evaluation case for an unmatched mention. Logging
    /// failures are already counted by the case log's failure window, so
    /// they do not fail the enrichment itself.
    async fn log_unmatched(&mut self, extraction: &StagedExtraction) {
        let message = match self.store.get_message(extraction.message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(extraction_id = extraction.id, "unmatched mention has no source message");
                return;
            }
            Err(error) => {
                warn!(extraction_id = extraction.id, error = %error, "cannot load source message");
                return;
            }
        };

        let case = EvaluationCase::new(
            Utc::now(),
            extraction.title.clone(),
            extraction.author.clone(),
            message.text.clone(),
            message.source_user_id.clone(),
            message.source_message_id.clone(),
        );

        if let Err(error) = self.caselog.append(&case, self.notifier.as_ref()).await {
            warn!(extraction_id = extraction.id, error = %error, "evaluation case logging failed");
        }
    }
}
