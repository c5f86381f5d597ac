//! Status reporter - read-only aggregation across all pipeline stages.

use std::fmt::Write as _;

use tracing::instrument;

use crate::store::{
    Confidence, EnrichmentFilter, EnrichmentStatus, ExtractionStatus, MessageStatus,
    PipelineStore, StoreError,
};

/// Aggregated pipeline counts with derived recommendations.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// Message counts per status.
    pub messages: Vec<(MessageStatus, i64)>,
    /// Extraction counts per status.
    pub extractions: Vec<(ExtractionStatus, i64)>,
    /// Low-confidence rows within `needs_review`.
    pub needs_review_low: i64,
    /// Medium-confidence rows within `needs_review`.
    pub needs_review_medium: i64,
    /// High-confidence rows within `needs_review`.
    pub needs_review_high: i64,
    /// Enrichment counts per status.
    pub enrichments: Vec<(EnrichmentStatus, i64)>,
    /// Multiple-candidate rows within `needs_selection`.
    pub needs_selection_multiple: i64,
    /// No-candidate rows within `needs_selection`.
    pub needs_selection_none: i64,
    /// Quality-flagged rows within `needs_selection`.
    pub needs_selection_quality: i64,
    /// Confirmed/edited extractions still waiting for enrichment.
    pub awaiting_enrichment: i64,
    /// Resolved enrichments waiting for finalization.
    pub awaiting_finalization: i64,
    /// Catalog book count.
    pub books: i64,
    /// Finalized review count.
    pub reviews: i64,
}

impl StatusReport {
    /// Gathers counts across every stage. No state mutation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any count query fails.
    #[instrument(skip(store))]
    pub async fn gather(store: &PipelineStore) -> Result<Self, StoreError> {
        let mut report = Self::default();

        for status in MessageStatus::all() {
            report
                .messages
                .push((status, store.count_messages_by_status(status).await?));
        }
        for status in ExtractionStatus::all() {
            report
                .extractions
                .push((status, store.count_extractions_by_status(status).await?));
        }
        report.needs_review_low = store
            .count_extractions_by_confidence(ExtractionStatus::NeedsReview, Confidence::Low)
            .await?;
        report.needs_review_medium = store
            .count_extractions_by_confidence(ExtractionStatus::NeedsReview, Confidence::Medium)
            .await?;
        report.needs_review_high = store
            .count_extractions_by_confidence(ExtractionStatus::NeedsReview, Confidence::High)
            .await?;

        for status in EnrichmentStatus::all() {
            report
                .enrichments
                .push((status, store.count_enrichments_by_status(status).await?));
        }
        report.needs_selection_multiple =
            store.count_needs_selection(EnrichmentFilter::Multiple).await?;
        report.needs_selection_none =
            store.count_needs_selection(EnrichmentFilter::NoResults).await?;
        report.needs_selection_quality =
            store.count_needs_selection(EnrichmentFilter::Quality).await?;

        report.awaiting_enrichment =
            store.list_enrichable_extractions(None).await?.len() as i64;
        report.awaiting_finalization =
            store.list_finalizable_enrichments().await?.len() as i64;
        report.books = store.count_books().await?;
        report.reviews = store.count_reviews().await?;

        Ok(report)
    }

    fn count<S: Copy + PartialEq>(counts: &[(S, i64)], wanted: S) -> i64 {
        counts
            .iter()
            .find(|(status, _)| *status == wanted)
            .map_or(0, |(_, count)| *count)
    }

    /// Derives the next recommended commands from non-empty buckets.
    #[must_use]
    pub fn recommended_commands(&self) -> Vec<&'static str> {
        let mut commands = Vec::new();

        if Self::count(&self.messages, MessageStatus::Pending) > 0 {
            commands.push("libris process");
        }
        if self.needs_review_high > 0 {
            commands.push("libris auto-review");
        }
        if Self::count(&self.extractions, ExtractionStatus::NeedsReview) > 0 {
            commands.push("libris review-extractions");
        }
        if self.awaiting_enrichment > 0 {
            commands.push("libris enrich");
        }
        if Self::count(&self.enrichments, EnrichmentStatus::NeedsSelection) > 0 {
            commands.push("libris review-enrichments");
        }
        if self.awaiting_finalization > 0 {
            commands.push("libris finalize");
        }

        commands
    }

    /// Renders the operator-facing summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "Messages:");
        for (status, count) in &self.messages {
            let _ = writeln!(out, "  {status:<16} {count}");
        }

        let _ = writeln!(out, "Extractions:");
        for (status, count) in &self.extractions {
            let _ = writeln!(out, "  {status:<16} {count}");
        }
        let _ = writeln!(
            out,
            "    needs_review by confidence: high {} / medium {} / low {}",
            self.needs_review_high, self.needs_review_medium, self.needs_review_low
        );

        let _ = writeln!(out, "Enrichments:");
        for (status, count) in &self.enrichments {
            let _ = writeln!(out, "  {status:<16} {count}");
        }
        let _ = writeln!(
            out,
            "    needs_selection breakdown: multiple {} / none {} / quality {}",
            self.needs_selection_multiple, self.needs_selection_none, self.needs_selection_quality
        );

        let _ = writeln!(out, "Awaiting enrichment:   {}", self.awaiting_enrichment);
        let _ = writeln!(out, "Awaiting finalization: {}", self.awaiting_finalization);
        let _ = writeln!(out, "Catalog: {} books, {} reviews", self.books, self.reviews);

        let commands = self.recommended_commands();
        if commands.is_empty() {
            let _ = writeln!(out, "Pipeline is drained; nothing to do.");
        } else {
            let _ = writeln!(out, "Next:");
            for command in commands {
                let _ = writeln!(out, "  {command}");
            }
        }

        out
    }
}
