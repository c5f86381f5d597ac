//! LLM extraction stage - turns pending messages into staged extractions.
//!
//! The extraction model itself is an external collaborator behind
//! [`MentionExtractor`]; this stage only drives the confidence-based
//! branching. The offline importer feeds it with a [`PrecomputedExtractor`]
//! reading a JSON artifact keyed by source message id.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::store::{
    AltMention, Confidence, ExtractionStatus, MessageAction, NewStagedExtraction, PipelineStore,
    StagedMessage, StoreError,
};

/// Errors surfaced by a mention extractor.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The extractor could not produce a result for this message.
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// One extraction result from the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedMention {
    /// Candidate title.
    pub title: String,
    /// Candidate author.
    pub author: Option<String>,
    /// Extractor confidence.
    pub confidence: Confidence,
    /// Alternative (title, author) mentions.
    #[serde(default)]
    pub alternatives: Vec<AltMention>,
}

/// Title/author/confidence extraction function (external collaborator).
#[async_trait]
pub trait MentionExtractor: Send + Sync {
    /// Extracts the book mention from one staged message.
    async fn extract(&self, message: &StagedMessage) -> Result<ExtractedMention, ExtractorError>;
}

/// Extractor backed by a precomputed JSON artifact keyed by source message
/// id. Used by the offline bulk importer, where model output is produced
/// ahead of time.
pub struct PrecomputedExtractor {
    mentions: HashMap<String, ExtractedMention>,
}

impl PrecomputedExtractor {
    /// Loads the artifact from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractorError::Failed`] if the file cannot be read or
    /// parsed.
    pub fn from_path(path: &Path) -> Result<Self, ExtractorError> {
        let raw = fs::read_to_string(path)
            .map_err(|error| ExtractorError::Failed(format!("cannot read {}: {error}", path.display())))?;
        let mentions = serde_json::from_str(&raw)
            .map_err(|error| ExtractorError::Failed(format!("cannot parse {}: {error}", path.display())))?;
        Ok(Self { mentions })
    }

    /// Builds an extractor from in-memory mentions (tests, bot runtime).
    #[must_use]
    pub fn from_mentions(mentions: HashMap<String, ExtractedMention>) -> Self {
        Self { mentions }
    }
}

#[async_trait]
impl MentionExtractor for PrecomputedExtractor {
    async fn extract(&self, message: &StagedMessage) -> Result<ExtractedMention, ExtractorError> {
        self.mentions
            .get(&message.source_message_id)
            .cloned()
            .ok_or_else(|| {
                ExtractorError::Failed(format!(
                    "no precomputed extraction for message {}",
                    message.source_message_id
                ))
            })
    }
}

/// Counters reported by one process run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Pending messages examined.
    pub processed: u32,
    /// Extractions staged for human review.
    pub needs_review: u32,
    /// High-confidence extractions confirmed automatically.
    pub auto_confirmed: u32,
    /// Messages whose extraction failed.
    pub failed: u32,
}

/// LLM extraction stage.
pub struct ProcessStage {
    store: PipelineStore,
    extractor: Arc<dyn MentionExtractor>,
    auto_confirm_high: bool,
}

impl ProcessStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: PipelineStore, extractor: Arc<dyn MentionExtractor>) -> Self {
        Self {
            store,
            extractor,
            auto_confirm_high: false,
        }
    }

    /// Confirms high-confidence extractions without staging them for review.
    #[must_use]
    pub fn with_auto_confirm_high(mut self, auto_confirm_high: bool) -> Self {
        self.auto_confirm_high = auto_confirm_high;
        self
    }

    /// Runs extraction over pending messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only for failures listing the work queue;
    /// per-message failures are counted and skipped.
    #[instrument(skip(self))]
    pub async fn run(&self, limit: Option<i64>) -> Result<ProcessReport, StoreError> {
        let pending = self
            .store
            .list_messages_by_status(crate::store::MessageStatus::Pending, limit)
            .await?;

        let mut report = ProcessReport::default();

        for message in pending {
            report.processed += 1;
            match self.extractor.extract(&message).await {
                Ok(mention) => {
                    if let Err(error) = self.stage_extraction(&message, &mention).await {
                        warn!(message_id = message.id, error = %error, "staging extraction failed");
                        report.failed += 1;
                        let _ = self
                            .store
                            .transition_message(message.id, MessageAction::Fail)
                            .await;
                        continue;
                    }

                    if self.auto_confirm_high && mention.confidence == Confidence::High {
                        report.auto_confirmed += 1;
                    } else {
                        report.needs_review += 1;
                    }
                }
                Err(error) => {
                    debug!(message_id = message.id, error = %error, "extractor failed");
                    report.failed += 1;
                    let _ = self
                        .store
                        .transition_message(message.id, MessageAction::Fail)
                        .await;
                }
            }
        }

        Ok(report)
    }

    async fn stage_extraction(
        &self,
        message: &StagedMessage,
        mention: &ExtractedMention,
    ) -> Result<(), StoreError> {
        let status = if self.auto_confirm_high && mention.confidence == Confidence::High {
            ExtractionStatus::Confirmed
        } else {
            ExtractionStatus::NeedsReview
        };

        self.store
            .insert_extraction(&NewStagedExtraction {
                message_id: message.id,
                title: &mention.title,
                author: mention.author.as_deref(),
                confidence: mention.confidence,
                alternatives: &mention.alternatives,
                status,
            })
            .await?;

        self.store
            .transition_message(message.id, MessageAction::Extract)
            .await?;
        Ok(())
    }
}
