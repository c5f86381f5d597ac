//! Extract command handler.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use libris_core::export::load_export;
use libris_core::pipeline::ExtractStage;
use libris_core::store::PipelineStore;

pub async fn run_extract_command(
    store: PipelineStore,
    input: &Path,
    source_id: &str,
    marker: &str,
) -> Result<()> {
    let export = load_export(input)
        .with_context(|| format!("cannot load chat export '{}'", input.display()))?;
    info!(
        messages = export.messages.len(),
        chat = export.name.as_deref().unwrap_or(source_id),
        "loaded chat export"
    );

    let stage = ExtractStage::new(store, marker).context("cannot configure extraction stage")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("staging messages from {}", input.display()));

    let report = stage.run(&export, source_id).await;
    spinner.finish_and_clear();

    info!(
        matched = report.matched,
        staged = report.staged,
        already_reviewed = report.duplicate_reviews,
        already_staged = report.duplicate_staged,
        errors = report.errors,
        "extract complete"
    );

    Ok(())
}
