//! Finalize command handler.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use libris_core::matching::MatchingEngine;
use libris_core::metadata::MetadataSource;
use libris_core::pipeline::{FinalizeStage, UnlabeledSentiment};
use libris_core::store::PipelineStore;

pub async fn run_finalize_command(
    store: PipelineStore,
    source: Arc<dyn MetadataSource>,
    dry_run: bool,
) -> Result<()> {
    let engine = MatchingEngine::new(store.clone(), source);
    let stage = FinalizeStage::new(store, engine, Arc::new(UnlabeledSentiment))
        .with_dry_run(dry_run);

    let report = stage.run().await?;

    info!(
        dry_run,
        processed = report.processed,
        books_created = report.books_created,
        books_reused = report.books_reused,
        reviews_created = report.reviews_created,
        errors = report.errors,
        "finalize complete"
    );

    if dry_run {
        info!("dry run: no durable state was written");
    }

    Ok(())
}
