//! Process command handler.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use libris_core::pipeline::{PrecomputedExtractor, ProcessStage};
use libris_core::store::PipelineStore;

pub async fn run_process_command(
    store: PipelineStore,
    extractions: &Path,
    limit: Option<i64>,
    auto_confirm_high: bool,
) -> Result<()> {
    let extractor = PrecomputedExtractor::from_path(extractions)
        .with_context(|| format!("cannot load extraction artifact '{}'", extractions.display()))?;

    let stage = ProcessStage::new(store, Arc::new(extractor))
        .with_auto_confirm_high(auto_confirm_high);
    let report = stage.run(limit).await?;

    info!(
        processed = report.processed,
        needs_review = report.needs_review,
        auto_confirmed = report.auto_confirmed,
        failed = report.failed,
        "process complete"
    );

    Ok(())
}
