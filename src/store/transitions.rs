//! Pure status-transition functions for the pipeline state machine.
//!
//! Every durable status change goes through one of these functions before
//! the store writes it, keeping the state machine checkable without a
//! database. Transitions are monotonic forward; `postpone` is deliberately
//! absent because it only resets a row's creation timestamp.

use super::enrichment::EnrichmentStatus;
use super::extraction::ExtractionStatus;
use super::message::MessageStatus;

/// Actions the LLM extraction stage applies to a staged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    /// Extraction succeeded and a staged extraction was written.
    Extract,
    /// The extractor failed for this message.
    Fail,
    /// Operator excluded the message.
    Skip,
}

impl MessageAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Fail => "fail",
            Self::Skip => "skip",
        }
    }
}

/// Actions applied to a staged extraction during review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionAction {
    /// Accept the extracted title/author as-is.
    Confirm,
    /// Operator corrected the title/author.
    Edit,
    /// Exclude from enrichment.
    Skip,
}

impl ExtractionAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Edit => "edit",
            Self::Skip => "skip",
        }
    }
}

/// Actions applied to a staged enrichment during selection review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentAction {
    /// A candidate match was chosen.
    Select,
    /// Operator resolved the book through an ISBN lookup.
    EnterIsbn,
    /// Operator typed the book in by hand.
    ManualEntry,
    /// Permanently exclude from finalization.
    Skip,
}

impl EnrichmentAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::EnterIsbn => "enter_isbn",
            Self::ManualEntry => "manual_entry",
            Self::Skip => "skip",
        }
    }
}

/// Transition function for staged messages. `None` means invalid.
#[must_use]
pub fn message_transition(current: MessageStatus, action: MessageAction) -> Option<MessageStatus> {
    match (current, action) {
        (MessageStatus::Pending, MessageAction::Extract) => Some(MessageStatus::Extracted),
        (MessageStatus::Pending, MessageAction::Fail) => Some(MessageStatus::Failed),
        // Failed messages may be retried by a later run and then skipped
        (MessageStatus::Pending | MessageStatus::Failed, MessageAction::Skip) => {
            Some(MessageStatus::Skipped)
        }
        (MessageStatus::Failed, MessageAction::Extract) => Some(MessageStatus::Extracted),
        _ => None,
    }
}

/// Transition function for staged extractions. `None` means invalid.
#[must_use]
pub fn extraction_transition(
    current: ExtractionStatus,
    action: ExtractionAction,
) -> Option<ExtractionStatus> {
    match (current, action) {
        (ExtractionStatus::NeedsReview, ExtractionAction::Confirm) => {
            Some(ExtractionStatus::Confirmed)
        }
        (ExtractionStatus::NeedsReview, ExtractionAction::Edit) => Some(ExtractionStatus::Edited),
        (ExtractionStatus::NeedsReview, ExtractionAction::Skip) => Some(ExtractionStatus::Skipped),
        _ => None,
    }
}

/// Transition function for staged enrichments. `None` means invalid.
#[must_use]
pub fn enrichment_transition(
    current: EnrichmentStatus,
    action: EnrichmentAction,
) -> Option<EnrichmentStatus> {
    match (current, action) {
        (EnrichmentStatus::NeedsSelection, EnrichmentAction::Select) => {
            Some(EnrichmentStatus::Selected)
        }
        (EnrichmentStatus::NeedsSelection, EnrichmentAction::EnterIsbn) => {
            Some(EnrichmentStatus::IsbnEntered)
        }
        (EnrichmentStatus::NeedsSelection, EnrichmentAction::ManualEntry) => {
            Some(EnrichmentStatus::ManualEntry)
        }
        (EnrichmentStatus::NeedsSelection, EnrichmentAction::Skip) => {
            Some(EnrichmentStatus::Skipped)
        }
        _ => None,
    }
}
