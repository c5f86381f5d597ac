//! Pipeline stages.
//!
//! Each stage is an independently-invoked process over the stage store:
//! extract stages messages, process extracts mentions, enrich attaches
//! candidate matches, the review stages apply human correction, finalize
//! produces catalog books and reviews, and the reporter aggregates counts.
//! Data flows strictly forward; stages are idempotent and re-runnable.

pub mod auto_review;
pub mod enrich;
pub mod extract;
pub mod finalize;
pub mod process;
pub mod report;
pub mod review;

pub use auto_review::{AutoReviewReport, AutoReviewStage};
pub use enrich::{EnrichReport, EnrichStage};
pub use extract::{DEFAULT_MARKER, ExtractReport, ExtractStage};
pub use finalize::{
    FinalizeReport, FinalizeStage, Resolution, SentimentClassifier, UnlabeledSentiment,
};
pub use process::{
    ExtractedMention, ExtractorError, MentionExtractor, PrecomputedExtractor, ProcessReport,
    ProcessStage,
};
pub use report::StatusReport;
pub use review::{
    EnrichmentReviewReport, EnrichmentReviewSession, ExtractionReviewReport,
    ExtractionReviewSession, SessionError, manual_placeholder_id,
};
