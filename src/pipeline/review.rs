//! Interactive review stages - human correction over low-confidence
//! extractions and ambiguous enrichments.
//!
//! Sessions are generic over their input/output handles so tests can drive
//! them with in-memory buffers. Invalid menu input re-prompts without any
//! state change; quit (or EOF) ends the session immediately with all prior
//! writes retained - no batch rollback.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::isbn;
use crate::metadata::{MetadataError, MetadataSource, VolumeRecord};
use crate::store::{
    EnrichmentFilter, ExtractionAction, ExtractionFilter, ExtractionStatus, PipelineStore,
    StagedEnrichment, StoreError,
};

/// Errors that abort an interactive session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Terminal I/O failed.
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Provider lookup failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Generates a synthetic unique placeholder id for a manual entry, so two
/// independent manual entries never collide.
#[must_use]
pub fn manual_placeholder_id() -> String {
    format!("manual-{:016x}", rand::random::<u64>())
}

/// Reads one trimmed line after printing a prompt; `None` on EOF.
fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    text: &str,
) -> std::io::Result<Option<String>> {
    write!(output, "{text}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

// ==================== Extraction Review ====================

/// Counters reported by one extraction review session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReviewReport {
    /// Extractions confirmed as-is.
    pub confirmed: u32,
    /// Extractions accepted with corrections.
    pub edited: u32,
    /// Extractions excluded from enrichment.
    pub skipped: u32,
    /// Session ended early by the operator.
    pub quit: bool,
}

/// Interactive session over `needs_review` extractions.
pub struct ExtractionReviewSession<R: BufRead, W: Write> {
    store: PipelineStore,
    filter: ExtractionFilter,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ExtractionReviewSession<R, W> {
    /// Creates a session over the given handles.
    #[must_use]
    pub fn new(store: PipelineStore, filter: ExtractionFilter, input: R, output: W) -> Self {
        Self {
            store,
            filter,
            input,
            output,
        }
    }

    /// Runs the session until the queue drains or the operator quits.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on I/O or store failure; progress already
    /// committed is retained.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<ExtractionReviewReport, SessionError> {
        let mut report = ExtractionReviewReport::default();

        loop {
            let rows = self
                .store
                .list_extractions_by_status(ExtractionStatus::NeedsReview, self.filter, Some(1))
                .await?;
            let Some(extraction) = rows.into_iter().next() else {
                writeln!(self.output, "No extractions waiting for review.")?;
                break;
            };

            if let Some(message) = self.store.get_message(extraction.message_id).await? {
                writeln!(self.output, "\nMessage: {}", message.text)?;
            }
            writeln!(
                self.output,
                "Extracted: \"{}\"{} (confidence: {})",
                extraction.title,
                extraction
                    .author
                    .as_deref()
                    .map(|author| format!(" by {author}"))
                    .unwrap_or_default(),
                extraction.confidence()
            )?;
            for (n, alternative) in extraction.parse_alternatives().iter().enumerate() {
                writeln!(
                    self.output,
                    "  alt {}: \"{}\"{}",
                    n + 1,
                    alternative.title,
                    alternative
                        .author
                        .as_deref()
                        .map(|author| format!(" by {author}"))
                        .unwrap_or_default()
                )?;
            }

            loop {
                let Some(choice) =
                    prompt(&mut self.input, &mut self.output, "[c]onfirm / [e]dit / [s]kip / [q]uit > ")?
                else {
                    report.quit = true;
                    return Ok(report);
                };

                match choice.as_str() {
                    "c" => {
                        self.store
                            .transition_extraction(extraction.id, ExtractionAction::Confirm, None)
                            .await?;
                        report.confirmed += 1;
                        break;
                    }
                    "e" => {
                        let Some(title) = prompt(
                            &mut self.input,
                            &mut self.output,
                            "Title [blank keeps current]: ",
                        )?
                        else {
                            report.quit = true;
                            return Ok(report);
                        };
                        let Some(author) = prompt(
                            &mut self.input,
                            &mut self.output,
                            "Author [blank keeps current, '-' clears]: ",
                        )?
                        else {
                            report.quit = true;
                            return Ok(report);
                        };

                        let title = if title.is_empty() {
                            extraction.title.clone()
                        } else {
                            title
                        };
                        let author = match author.as_str() {
                            "" => extraction.author.clone(),
                            "-" => None,
                            edited => Some(edited.to_string()),
                        };

                        self.store
                            .transition_extraction(
                                extraction.id,
                                ExtractionAction::Edit,
                                Some((&title, author.as_deref())),
                            )
                            .await?;
                        report.edited += 1;
                        break;
                    }
                    "s" => {
                        self.store
                            .transition_extraction(extraction.id, ExtractionAction::Skip, None)
                            .await?;
                        report.skipped += 1;
                        break;
                    }
                    "q" => {
                        report.quit = true;
                        return Ok(report);
                    }
                    _ => {
                        writeln!(self.output, "Invalid choice.")?;
                    }
                }
            }
        }

        Ok(report)
    }
}

// ==================== Enrichment Review ====================

/// Counters reported by one enrichment review session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReviewReport {
    /// Candidates selected.
    pub selected: u32,
    /// Rows resolved through ISBN lookup.
    pub isbn_entered: u32,
    /// Manual entries.
    pub manual_entries: u32,
    /// Rows permanently excluded.
    pub skipped: u32,
    /// Rows postponed to a later run.
    pub postponed: u32,
    /// Session ended early by the operator.
    pub quit: bool,
}

/// Outcome of the ISBN sub-flow.
enum IsbnOutcome {
    Entered,
    Cancelled,
    Quit,
}

/// Interactive session over `needs_selection` enrichments.
pub struct EnrichmentReviewSession<R: BufRead, W: Write> {
    store: PipelineStore,
    source: Arc<dyn MetadataSource>,
    filter: EnrichmentFilter,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> EnrichmentReviewSession<R, W> {
    /// Creates a session over the given handles.
    #[must_use]
    pub fn new(
        store: PipelineStore,
        source: Arc<dyn MetadataSource>,
        filter: EnrichmentFilter,
        input: R,
        output: W,
    ) -> Self {
        Self {
            store,
            source,
            filter,
            input,
            output,
        }
    }

    /// Runs the session until the queue drains or the operator quits.
    /// Postponed rows re-enter at the back of the next run's queue.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on I/O or store failure; progress already
    /// committed is retained.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<EnrichmentReviewReport, SessionError> {
        let mut report = EnrichmentReviewReport::default();
        let mut postponed: HashSet<i64> = HashSet::new();

        loop {
            let rows = self.store.list_needs_selection(self.filter, None).await?;
            let Some(enrichment) = rows.into_iter().find(|row| !postponed.contains(&row.id))
            else {
                writeln!(self.output, "No enrichments waiting for selection.")?;
                break;
            };

            self.present(&enrichment)?;
            let candidates = enrichment.parse_candidates();

            loop {
                let Some(choice) = prompt(
                    &mut self.input,
                    &mut self.output,
                    "Select candidate number, [i]sbn, [m]anual, [s]kip, [p]ostpone, [q]uit > ",
                )?
                else {
                    report.quit = true;
                    return Ok(report);
                };

                if let Ok(n) = choice.parse::<usize>() {
                    if n >= 1 && n <= candidates.len() {
                        self.store
                            .select_candidate(enrichment.id, &candidates[n - 1])
                            .await?;
                        report.selected += 1;
                        break;
                    }
                    writeln!(self.output, "No candidate {n}.")?;
                    continue;
                }

                match choice.as_str() {
                    "i" => match self.isbn_flow(enrichment.id).await? {
                        IsbnOutcome::Entered => {
                            report.isbn_entered += 1;
                            break;
                        }
                        IsbnOutcome::Cancelled => {}
                        IsbnOutcome::Quit => {
                            report.quit = true;
                            return Ok(report);
                        }
                    },
                    "m" => {
                        if self.manual_flow(enrichment.id).await? {
                            report.manual_entries += 1;
                            break;
                        }
                    }
                    "s" => {
                        self.store.skip_enrichment(enrichment.id).await?;
                        report.skipped += 1;
                        break;
                    }
                    "p" => {
                        self.store.postpone_enrichment(enrichment.id).await?;
                        postponed.insert(enrichment.id);
                        report.postponed += 1;
                        break;
                    }
                    "q" => {
                        report.quit = true;
                        return Ok(report);
                    }
                    _ => {
                        writeln!(self.output, "Invalid choice.")?;
                    }
                }
            }
        }

        Ok(report)
    }

    fn present(&mut self, enrichment: &StagedEnrichment) -> std::io::Result<()> {
        writeln!(
            self.output,
            "\nSearched: \"{}\"{}",
            enrichment.search_title,
            enrichment
                .search_author
                .as_deref()
                .map(|author| format!(" by {author}"))
                .unwrap_or_default()
        )?;

        let candidates = enrichment.parse_candidates();
        if candidates.is_empty() {
            writeln!(self.output, "No candidate matches were found.")?;
        } else {
            for (n, candidate) in candidates.iter().enumerate() {
                let mut notes = Vec::new();
                if candidate.missing_cover() {
                    notes.push("no cover");
                }
                if candidate.missing_metadata() {
                    notes.push("sparse metadata");
                }
                let notes = if notes.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", notes.join(", "))
                };
                writeln!(
                    self.output,
                    "  {}. \"{}\"{}{}{}",
                    n + 1,
                    candidate.title,
                    candidate
                        .author
                        .as_deref()
                        .map(|author| format!(" by {author}"))
                        .unwrap_or_default(),
                    candidate
                        .published_year
                        .map(|year| format!(" ({year})"))
                        .unwrap_or_default(),
                    notes
                )?;
            }
        }
        Ok(())
    }

    async fn isbn_flow(&mut self, enrichment_id: i64) -> Result<IsbnOutcome, SessionError> {
        loop {
            let Some(raw) = prompt(
                &mut self.input,
                &mut self.output,
                "ISBN (10 or 13 digits, [c]ancel): ",
            )?
            else {
                return Ok(IsbnOutcome::Quit);
            };
            if raw == "c" {
                return Ok(IsbnOutcome::Cancelled);
            }

            let Some(cleaned) = isbn::validate(&raw) else {
                writeln!(self.output, "Not a valid ISBN format.")?;
                continue;
            };

            let Some(record) = self.source.search_by_isbn(&cleaned).await? else {
                writeln!(self.output, "No volume found for ISBN {cleaned}.")?;
                continue;
            };

            writeln!(
                self.output,
                "Found: \"{}\"{}",
                record.title,
                record
                    .author
                    .as_deref()
                    .map(|author| format!(" by {author}"))
                    .unwrap_or_default()
            )?;

            loop {
                let Some(choice) = prompt(
                    &mut self.input,
                    &mut self.output,
                    "[a]ccept / [r]etry / [c]ancel > ",
                )?
                else {
                    return Ok(IsbnOutcome::Quit);
                };
                match choice.as_str() {
                    "a" => {
                        self.store
                            .record_isbn_entry(enrichment_id, &cleaned, &record)
                            .await?;
                        return Ok(IsbnOutcome::Entered);
                    }
                    "r" => break,
                    "c" => return Ok(IsbnOutcome::Cancelled),
                    _ => writeln!(self.output, "Invalid choice.")?,
                }
            }
        }
    }

    /// Returns true when a manual entry was recorded.
    async fn manual_flow(&mut self, enrichment_id: i64) -> Result<bool, SessionError> {
        let Some(title) = prompt(
            &mut self.input,
            &mut self.output,
            "Title [blank cancels]: ",
        )?
        else {
            return Ok(false);
        };
        if title.is_empty() {
            return Ok(false);
        }

        let Some(author) = prompt(&mut self.input, &mut self.output, "Author [blank for none]: ")?
        else {
            return Ok(false);
        };
        let author = if author.is_empty() { None } else { Some(author) };

        let record = VolumeRecord {
            volume_id: manual_placeholder_id(),
            title,
            author,
            description: None,
            genres: Vec::new(),
            published_year: None,
            cover_url: None,
            isbn: None,
            page_count: None,
        };

        debug!(volume_id = %record.volume_id, "manual entry");
        self.store.record_manual_entry(enrichment_id, &record).await?;
        Ok(true)
    }
}
