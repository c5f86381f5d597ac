//! Enrich command handler.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use libris_core::alert::{Notifier, SystemClock};
use libris_core::caselog::EvaluationCaseLog;
use libris_core::matching::MatchingEngine;
use libris_core::metadata::MetadataSource;
use libris_core::pipeline::EnrichStage;
use libris_core::store::PipelineStore;

pub async fn run_enrich_command(
    store: PipelineStore,
    source: Arc<dyn MetadataSource>,
    notifier: Arc<dyn Notifier>,
    case_log_dir: &Path,
    limit: Option<i64>,
) -> Result<()> {
    let engine = MatchingEngine::new(store.clone(), source);
    let caselog = EvaluationCaseLog::new(case_log_dir, SystemClock);

    let mut stage = EnrichStage::new(store, engine, caselog, notifier);
    let report = stage.run(limit).await?;

    info!(
        processed = report.processed,
        auto_selected = report.auto_selected,
        needs_selection = report.needs_selection,
        no_results = report.no_results,
        errors = report.errors,
        "enrich complete"
    );

    Ok(())
}
