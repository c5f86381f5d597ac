//! Book matching engine - local catalog search with external fallback.
//!
//! The engine prefers precision and cheap lookups: the local catalog is
//! always consulted first, and the external provider is queried only for
//! mentions that found nothing locally. External search is strictly a
//! fallback; it never overrides a catalog hit.
//!
//! # Overview
//!
//! - [`MatchingEngine`] - Local + external threshold search and pooling
//! - [`CatalogMatch`] - A local catalog hit with its component scores
//! - [`ScoredVolume`] - An external hit with its component scores
//! - [`EnrichedMatches`] - Pooled, deduplicated candidates for one mention

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::metadata::{MetadataError, MetadataSource, VolumeRecord, structured_query};
use crate::similarity::{normalize, similarity};
use crate::store::{AltMention, Book, PipelineStore, StoreError};

/// Similarity threshold a candidate must meet on title (and author, when
/// both sides carry one).
pub const MATCH_THRESHOLD: f64 = 0.9;

/// Maximum pooled candidates presented for one mention.
const MAX_POOLED_MATCHES: usize = 3;

/// Maximum ranked matches returned by the external threshold search.
const MAX_EXTERNAL_MATCHES: usize = 3;

/// Raw results requested from the provider before threshold filtering.
const EXTERNAL_SEARCH_WINDOW: u32 = 10;

/// Alternative mentions considered beyond the primary one.
const MAX_ALTERNATIVE_MENTIONS: usize = 2;

/// Errors produced by the matching engine.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Catalog access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// External provider lookup failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// A local catalog hit that met the threshold.
#[derive(Debug, Clone)]
pub struct CatalogMatch {
    /// The matched catalog book.
    pub book: Book,
    /// Title similarity in `[0, 1]`.
    pub title_similarity: f64,
    /// Author similarity; a vacuous 1.0 when either side lacks an author.
    pub author_similarity: f64,
}

impl CatalogMatch {
    /// Mean of the title and author components, used for ranking.
    #[must_use]
    pub fn combined(&self) -> f64 {
        (self.title_similarity + self.author_similarity) / 2.0
    }
}

/// An external provider hit that met the threshold.
#[derive(Debug, Clone)]
pub struct ScoredVolume {
    /// The matched provider record.
    pub record: VolumeRecord,
    /// Title similarity in `[0, 1]`.
    pub title_similarity: f64,
    /// Author similarity; a vacuous 1.0 when either side lacks an author.
    pub author_similarity: f64,
}

impl ScoredVolume {
    /// Mean of the title and author components, used for ranking.
    #[must_use]
    pub fn combined(&self) -> f64 {
        (self.title_similarity + self.author_similarity) / 2.0
    }
}

/// Where the pooled candidates for a mention came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// At least one candidate came from the local catalog.
    Local,
    /// Candidates came only from the external provider.
    External,
    /// The pool is empty.
    None,
}

impl MatchSource {
    /// Returns the reporting label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::External => "external",
            Self::None => "none",
        }
    }
}

/// Pooled, deduplicated candidates for one extraction.
#[derive(Debug, Clone)]
pub struct EnrichedMatches {
    /// Source of truth for the pool.
    pub source: MatchSource,
    /// At most three unique candidate records.
    pub matches: Vec<VolumeRecord>,
}

/// Scores a candidate (title, author) pair against a query pair.
///
/// Returns `None` below the threshold. When both sides carry an author the
/// author similarity must independently meet the threshold; when either
/// side lacks one, title-only matching applies and the author component is
/// a vacuous 1.0.
fn score_pair(
    query_title: &str,
    query_author: Option<&str>,
    candidate_title: &str,
    candidate_author: Option<&str>,
    threshold: f64,
) -> Option<(f64, f64)> {
    let title_similarity = similarity(query_title, candidate_title);
    if title_similarity < threshold {
        return None;
    }

    let author_similarity = match (query_author, candidate_author) {
        (Some(query), Some(candidate)) => {
            let author_similarity = similarity(query, candidate);
            if author_similarity < threshold {
                return None;
            }
            author_similarity
        }
        _ => 1.0,
    };

    Some((title_similarity, author_similarity))
}

/// Descending comparison by combined score.
fn by_combined_desc(left: f64, right: f64) -> Ordering {
    right.partial_cmp(&left).unwrap_or(Ordering::Equal)
}

/// Dedup key over normalized (title, author).
fn dedup_key(record: &VolumeRecord) -> (String, String) {
    (
        normalize(&record.title),
        record.author.as_deref().map(normalize).unwrap_or_default(),
    )
}

/// Converts a catalog book into the candidate payload shape.
fn book_to_record(book: &Book) -> VolumeRecord {
    VolumeRecord {
        volume_id: book
            .volume_id
            .clone()
            .unwrap_or_else(|| format!("catalog-{}", book.id)),
        title: book.title.clone(),
        author: book.author.clone(),
        description: book.description.clone(),
        genres: book.parse_genres(),
        published_year: book.published_year.and_then(|year| i32::try_from(year).ok()),
        cover_url: book.cover_url.clone(),
        isbn: book.isbn.clone(),
        page_count: book.page_count,
    }
}

/// Matching engine over the local catalog and an external metadata source.
pub struct MatchingEngine {
    store: PipelineStore,
    source: Arc<dyn MetadataSource>,
    threshold: f64,
}

impl MatchingEngine {
    /// Creates an engine with the default threshold.
    #[must_use]
    pub fn new(store: PipelineStore, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            store,
            source,
            threshold: MATCH_THRESHOLD,
        }
    }

    /// Overrides the similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Scans the local catalog for books whose title (and author, when both
    /// sides have one) meets the threshold, ranked by mean similarity.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::Store`] if the catalog scan fails.
    #[instrument(skip(self), fields(title = %title))]
    pub async fn search_local_catalog(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Vec<CatalogMatch>, MatchError> {
        let books = self.store.all_books().await?;

        let mut matches: Vec<CatalogMatch> = books
            .into_iter()
            .filter_map(|book| {
                score_pair(title, author, &book.title, book.author.as_deref(), self.threshold).map(
                    |(title_similarity, author_similarity)| CatalogMatch {
                        book,
                        title_similarity,
                        author_similarity,
                    },
                )
            })
            .collect();

        matches.sort_by(|left, right| by_combined_desc(left.combined(), right.combined()));

        debug!(count = matches.len(), "local catalog matches");
        Ok(matches)
    }

    /// Queries the external provider with a structured query and applies the
    /// same threshold filter; top three by mean similarity.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::Metadata`] if the provider lookup fails.
    #[instrument(skip(self), fields(title = %title))]
    pub async fn search_external_with_threshold(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Vec<ScoredVolume>, MatchError> {
        let query = structured_query(title, author);
        let records = self
            .source
            .search_by_query(&query, EXTERNAL_SEARCH_WINDOW)
            .await?;

        let mut matches: Vec<ScoredVolume> = records
            .into_iter()
            .filter_map(|record| {
                score_pair(
                    title,
                    author,
                    &record.title,
                    record.author.as_deref(),
                    self.threshold,
                )
                .map(|(title_similarity, author_similarity)| ScoredVolume {
                    record,
                    title_similarity,
                    author_similarity,
                })
            })
            .collect();

        matches.sort_by(|left, right| by_combined_desc(left.combined(), right.combined()));
        matches.truncate(MAX_EXTERNAL_MATCHES);

        debug!(count = matches.len(), "external matches over threshold");
        Ok(matches)
    }

    /// Pools candidates for the primary mention plus up to two alternatives.
    ///
    /// Local searches run concurrently; only mentions with zero local
    /// matches escalate to the external provider. The pool is deduplicated
    /// by normalized (title, author) and truncated to three.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] if a catalog scan or provider lookup fails.
    #[instrument(skip(self, alternatives), fields(title = %title))]
    pub async fn enrich_book_info(
        &self,
        title: &str,
        author: Option<&str>,
        alternatives: &[AltMention],
    ) -> Result<EnrichedMatches, MatchError> {
        let mut mentions: Vec<(String, Option<String>)> =
            vec![(title.to_string(), author.map(str::to_string))];
        mentions.extend(
            alternatives
                .iter()
                .take(MAX_ALTERNATIVE_MENTIONS)
                .map(|alt| (alt.title.clone(), alt.author.clone())),
        );

        let local_lookups = mentions
            .iter()
            .map(|(mention_title, mention_author)| {
                self.search_local_catalog(mention_title, mention_author.as_deref())
            });
        let local_results = join_all(local_lookups).await;

        let mut any_local = false;
        let mut any_external = false;
        let mut pool: Vec<VolumeRecord> = Vec::new();

        for ((mention_title, mention_author), local) in mentions.iter().zip(local_results) {
            let local = local?;
            if local.is_empty() {
                let external = self
                    .search_external_with_threshold(mention_title, mention_author.as_deref())
                    .await?;
                any_external |= !external.is_empty();
                pool.extend(external.into_iter().map(|scored| scored.record));
            } else {
                any_local = true;
                pool.extend(local.iter().map(|matched| book_to_record(&matched.book)));
            }
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        pool.retain(|record| seen.insert(dedup_key(record)));
        pool.truncate(MAX_POOLED_MATCHES);

        let source = if any_local {
            MatchSource::Local
        } else if any_external {
            MatchSource::External
        } else {
            MatchSource::None
        };

        debug!(source = source.as_str(), count = pool.len(), "enriched matches");
        Ok(EnrichedMatches { source, matches: pool })
    }
}
