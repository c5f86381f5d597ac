//! Review command handlers: interactive sessions and auto-review.

use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use libris_core::metadata::MetadataSource;
use libris_core::pipeline::{AutoReviewStage, EnrichmentReviewSession, ExtractionReviewSession};
use libris_core::store::{EnrichmentFilter, ExtractionFilter, PipelineStore};

pub async fn run_review_extractions_command(
    store: PipelineStore,
    filter: ExtractionFilter,
) -> Result<()> {
    let stdin = io::stdin();
    let session =
        ExtractionReviewSession::new(store, filter, stdin.lock(), io::stdout());
    let report = session.run().await?;

    info!(
        confirmed = report.confirmed,
        edited = report.edited,
        skipped = report.skipped,
        quit = report.quit,
        "extraction review session finished"
    );
    Ok(())
}

pub async fn run_review_enrichments_command(
    store: PipelineStore,
    source: Arc<dyn MetadataSource>,
    filter: EnrichmentFilter,
) -> Result<()> {
    let stdin = io::stdin();
    let session =
        EnrichmentReviewSession::new(store, source, filter, stdin.lock(), io::stdout());
    let report = session.run().await?;

    info!(
        selected = report.selected,
        isbn_entered = report.isbn_entered,
        manual_entries = report.manual_entries,
        skipped = report.skipped,
        postponed = report.postponed,
        quit = report.quit,
        "enrichment review session finished"
    );
    Ok(())
}

pub async fn run_auto_review_command(
    store: PipelineStore,
    limit: Option<i64>,
    dry_run: bool,
) -> Result<()> {
    let stage = AutoReviewStage::new(store).with_dry_run(dry_run);
    let report = stage.run(limit).await?;

    info!(
        dry_run,
        examined = report.examined,
        confirmed = report.confirmed,
        left_for_review = report.left_for_review,
        "auto-review complete"
    );
    Ok(())
}
