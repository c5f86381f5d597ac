//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use libris_core::metadata::{DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY};
use libris_core::pipeline::DEFAULT_MARKER;
use libris_core::store::{EnrichmentFilter, ExtractionFilter};

/// Stage, match, and catalog book reviews from chat exports.
///
/// Libris ingests free-text book reviews, identifies which book each review
/// discusses, and attaches normalized bibliographic metadata, producing a
/// deduplicated catalog of books and reviews.
#[derive(Parser, Debug)]
#[command(name = "libris")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// SQLite database path
    #[arg(long, global = true, default_value = "libris.db")]
    pub db: PathBuf,

    /// Marker hashtag (without '#') that makes a message reviewable
    #[arg(long, global = true, default_value = DEFAULT_MARKER)]
    pub marker: String,

    /// Metadata provider base URL override (testing/self-hosted mirrors)
    #[arg(long, global = true)]
    pub provider_url: Option<String>,

    /// Metadata provider API key
    #[arg(long, global = true, env = "LIBRIS_API_KEY")]
    pub api_key: Option<String>,

    /// Minimum delay between provider requests in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_MIN_DELAY.as_millis() as u64)]
    pub rate_limit: u64,

    /// Retry ceiling for provider rate-limit backoff (0-10)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: u32,

    /// Directory for unmatched-review evaluation cases
    #[arg(long, global = true, default_value = "eval-cases")]
    pub case_log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline subcommands, each reading/writing the stage store.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stage reviewable messages from a chat export file
    Extract {
        /// Path to the chat export JSON
        #[arg(long)]
        input: PathBuf,
        /// Source chat identifier recorded on staged messages
        #[arg(long = "source-id")]
        source_id: String,
    },

    /// Run the extraction model output over pending messages
    Process {
        /// Maximum messages to process
        #[arg(long)]
        limit: Option<i64>,
        /// Confirm high-confidence extractions without review
        #[arg(long)]
        auto_confirm_high: bool,
        /// Precomputed extraction artifact (JSON keyed by message id)
        #[arg(long)]
        extractions: PathBuf,
    },

    /// Interactively review extractions awaiting confirmation
    ReviewExtractions {
        /// Only show a subset of the review queue
        #[arg(long, value_enum)]
        filter: Option<ExtractionFilterArg>,
    },

    /// Confirm high-confidence extractions without interaction
    AutoReview {
        /// Maximum extractions to examine
        #[arg(long)]
        limit: Option<i64>,
        /// Preview without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Attach candidate book matches to confirmed extractions
    Enrich {
        /// Maximum extractions to enrich
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Interactively resolve enrichments awaiting selection
    ReviewEnrichments {
        /// Only show a subset of the selection queue
        #[arg(long, value_enum)]
        filter: Option<EnrichmentFilterArg>,
    },

    /// Create catalog books and reviews from resolved enrichments
    Finalize {
        /// Preview duplicate/creation counts without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show counts per stage and recommended next commands
    Status,
}

/// CLI filter over the extraction review queue.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionFilterArg {
    /// Low-confidence extractions.
    Low,
    /// Medium-confidence extractions.
    Medium,
    /// Extractions with alternative mentions.
    Alternatives,
}

impl From<ExtractionFilterArg> for ExtractionFilter {
    fn from(arg: ExtractionFilterArg) -> Self {
        match arg {
            ExtractionFilterArg::Low => Self::Low,
            ExtractionFilterArg::Medium => Self::Medium,
            ExtractionFilterArg::Alternatives => Self::Alternatives,
        }
    }
}

/// CLI filter over the enrichment selection queue.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentFilterArg {
    /// Rows with multiple candidate matches.
    Multiple,
    /// Rows with no candidate match.
    None,
    /// Rows with missing cover or sparse metadata.
    Quality,
}

impl From<EnrichmentFilterArg> for EnrichmentFilter {
    fn from(arg: EnrichmentFilterArg) -> Self {
        match arg {
            EnrichmentFilterArg::Multiple => Self::Multiple,
            EnrichmentFilterArg::None => Self::NoResults,
            EnrichmentFilterArg::Quality => Self::Quality,
        }
    }
}
