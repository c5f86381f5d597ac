//! Durable evaluation-case logging for unmatched reviews.
//!
//! When enrichment finds no candidate at all, the mention is not silently
//! dropped: it is appended as a JSON line to a monthly-rotated file so the
//! extraction logic can be evaluated against real misses later. Each record
//! is stamped with the extraction-logic version that produced it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::alert::{Clock, FailureWindow, Notifier};

/// Version stamp for records written by the current extraction logic.
pub const EXTRACTION_LOGIC_VERSION: u32 = 2;

/// Errors produced by case logging.
#[derive(Debug, Error)]
pub enum CaseLogError {
    /// I/O error creating or appending to the log file.
    #[error("I/O error writing evaluation case: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error (shouldn't occur for well-formed records).
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One unmatched-review evaluation case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCase {
    /// Extraction-logic version that produced this miss.
    pub logic_version: u32,
    /// When the case was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Title the matcher searched with.
    pub search_title: String,
    /// Author the matcher searched with, if any.
    pub search_author: Option<String>,
    /// Raw review text the mention came from.
    pub review_text: String,
    /// Source identifiers for tracing the case back to its message.
    pub source_user_id: String,
    /// Message id within the source chat.
    pub source_message_id: String,
}

/// Append-only, monthly-rotated evaluation-case log.
///
/// Write failures feed a sliding failure window; repeated failures escalate
/// once per burst through the [`Notifier`].
pub struct EvaluationCaseLog<C: Clock> {
    dir: PathBuf,
    clock: C,
    failures: FailureWindow<C>,
}

impl<C: Clock + Clone> EvaluationCaseLog<C> {
    /// Creates a case log rooted at `dir` (created on first append).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, clock: C) -> Self {
        let failures = FailureWindow::new(clock.clone());
        Self {
            dir: dir.into(),
            clock,
            failures,
        }
    }

    /// Path of the log file for the month containing `stamp`.
    #[must_use]
    pub fn file_for(&self, stamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("unmatched-cases-{}.jsonl", stamp.format("%Y-%m")))
    }

    /// Appends one case, escalating through `notifier` when the logging
    /// itself keeps failing.
    ///
    /// # Errors
    ///
    /// Returns [`CaseLogError`] when the append fails; the error is also
    /// counted toward the failure window.
    #[instrument(skip_all, fields(title = %case.search_title))]
    pub async fn append(
        &mut self,
        case: &EvaluationCase,
        notifier: &dyn Notifier,
    ) -> Result<(), CaseLogError> {
        match self.try_append(case) {
            Ok(path) => {
                debug!(path = %path.display(), "recorded evaluation case");
                Ok(())
            }
            Err(error) => {
                if self.failures.record_failure() {
                    notifier
                        .notify(&format!(
                            "evaluation-case logging is failing repeatedly: {error}"
                        ))
                        .await;
                }
                Err(error)
            }
        }
    }

    fn try_append(&self, case: &EvaluationCase) -> Result<PathBuf, CaseLogError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(self.clock.now());

        let mut line = serde_json::to_string(case)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(path)
    }

    /// Directory the log writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EvaluationCase {
    /// Builds a case from the search terms and source message data.
    #[must_use]
    pub fn new(
        recorded_at: DateTime<Utc>,
        search_title: impl Into<String>,
        search_author: Option<String>,
        review_text: impl Into<String>,
        source_user_id: impl Into<String>,
        source_message_id: impl Into<String>,
    ) -> Self {
        Self {
            logic_version: EXTRACTION_LOGIC_VERSION,
            recorded_at,
            search_title: search_title.into(),
            search_author,
            review_text: review_text.into(),
            source_user_id: source_user_id.into(),
            source_message_id: source_message_id.into(),
        }
    }
}
