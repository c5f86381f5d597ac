//! CLI entry point for the libris pipeline tool.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use libris_core::alert::TracingNotifier;
use libris_core::metadata::{BackoffPolicy, VolumesClient};
use libris_core::store::PipelineStore;
use libris_core::Database;

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs).
    // The interface contract is exit code 1 on invalid/missing arguments;
    // help and version keep the conventional success exit.
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let _ = error.print();
            let code = match error.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
            return code;
        }
    };

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let db = Database::new(&args.db).await?;
    let store = PipelineStore::new(db);

    match args.command {
        Command::Extract { input, source_id } => {
            commands::run_extract_command(store, &input, &source_id, &args.marker).await
        }
        Command::Process {
            limit,
            auto_confirm_high,
            extractions,
        } => commands::run_process_command(store, &extractions, limit, auto_confirm_high).await,
        Command::ReviewExtractions { filter } => {
            commands::run_review_extractions_command(
                store,
                filter.map(Into::into).unwrap_or_default(),
            )
            .await
        }
        Command::AutoReview { limit, dry_run } => {
            commands::run_auto_review_command(store, limit, dry_run).await
        }
        Command::Enrich { limit } => {
            let source = build_provider_client(&args)?;
            commands::run_enrich_command(
                store,
                source,
                Arc::new(TracingNotifier),
                &args.case_log_dir,
                limit,
            )
            .await
        }
        Command::ReviewEnrichments { filter } => {
            let source = build_provider_client(&args)?;
            commands::run_review_enrichments_command(
                store,
                source,
                filter.map(Into::into).unwrap_or_default(),
            )
            .await
        }
        Command::Finalize { dry_run } => {
            let source = build_provider_client(&args)?;
            commands::run_finalize_command(store, source, dry_run).await
        }
        Command::Status => commands::run_status_command(store).await,
    }
}

fn build_provider_client(args: &Cli) -> Result<Arc<VolumesClient>> {
    let mut client = match &args.provider_url {
        Some(base_url) => VolumesClient::with_base_url(base_url)?,
        None => VolumesClient::new()?,
    };

    client = client
        .with_min_delay(Duration::from_millis(args.rate_limit))
        .with_backoff(BackoffPolicy::with_max_retries(args.max_retries))
        .with_notifier(Arc::new(TracingNotifier));

    if let Some(api_key) = &args.api_key {
        client = client.with_api_key(api_key);
    }

    Ok(Arc::new(client))
}
