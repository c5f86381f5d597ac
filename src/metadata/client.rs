//! Volumes API client - searches the external bibliographic provider.
//!
//! The provider exposes a Google-Books-style volumes API: full-text search
//! at `/volumes?q=...` with `intitle:`/`inauthor:`/`isbn:` field tokens,
//! and direct lookup at `/volumes/{id}`. Responses are normalized into
//! [`VolumeRecord`]s; missing fields never fail a whole result set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::alert::{Notifier, TracingNotifier};

use super::error::MetadataError;
use super::pacer::RequestPacer;
use super::retry::{BackoffPolicy, parse_retry_after};

/// Default provider API base URL.
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";

/// Request timeout for provider calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Results requested per cascade strategy; the first hit wins anyway.
const FALLBACK_MAX_RESULTS: u32 = 3;

/// A normalized bibliographic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Provider volume id, unique within the provider namespace.
    pub volume_id: String,
    /// Volume title.
    pub title: String,
    /// Authors joined into one display string, when present.
    pub author: Option<String>,
    /// Back-cover description.
    pub description: Option<String>,
    /// Genre/category labels.
    pub genres: Vec<String>,
    /// Publication year.
    pub published_year: Option<i32>,
    /// Cover thumbnail URL.
    pub cover_url: Option<String>,
    /// ISBN-13 preferred over ISBN-10 when both are present.
    pub isbn: Option<String>,
    /// Page count.
    pub page_count: Option<i64>,
}

impl VolumeRecord {
    /// True when the record has no cover URL.
    #[must_use]
    pub fn missing_cover(&self) -> bool {
        self.cover_url.is_none()
    }

    /// True when core descriptive metadata is absent.
    #[must_use]
    pub fn missing_metadata(&self) -> bool {
        self.description.is_none() || self.published_year.is_none()
    }
}

/// Builds a structured field query: `intitle:"<title>"` with an optional
/// `+inauthor:"<author>"` token.
#[must_use]
pub fn structured_query(title: &str, author: Option<&str>) -> String {
    match author {
        Some(author) => format!("intitle:\"{title}\"+inauthor:\"{author}\""),
        None => format!("intitle:\"{title}\""),
    }
}

/// Builds the unstructured last-resort query.
#[must_use]
pub fn free_text_query(title: &str, author: Option<&str>) -> String {
    match author {
        Some(author) => format!("{title} {author}"),
        None => title.to_string(),
    }
}

/// Abstract bibliographic search provider.
///
/// The cascade in [`search_with_fallbacks`](MetadataSource::search_with_fallbacks)
/// is a default method so that test doubles only implement the primitive
/// operations.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Searches the provider with a raw query string.
    async fn search_by_query(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<VolumeRecord>, MetadataError>;

    /// Fetches one volume by provider id.
    async fn get_by_id(&self, id: &str) -> Result<Option<VolumeRecord>, MetadataError>;

    /// Searches by ISBN (`isbn:<digits>` query).
    async fn search_by_isbn(&self, isbn: &str) -> Result<Option<VolumeRecord>, MetadataError> {
        let results = self
            .search_by_query(&format!("isbn:{isbn}"), 1)
            .await?;
        Ok(results.into_iter().next())
    }

    /// Cascading multi-strategy search; the first strategy that yields any
    /// result wins and later strategies are never issued.
    ///
    /// Order: (1) title+author; (2) title alone; (3) each title variant +
    /// author; (4) each title variant alone; (5) primary title + each author
    /// variant; (6) free text. The order prefers precision over recall -
    /// the noisy free-text query runs only after every structured attempt
    /// came back empty.
    async fn search_with_fallbacks(
        &self,
        title: &str,
        author: Option<&str>,
        title_variants: &[String],
        author_variants: &[String],
    ) -> Result<Option<VolumeRecord>, MetadataError> {
        let mut queries: Vec<String> = Vec::new();

        if author.is_some() {
            queries.push(structured_query(title, author));
        }
        queries.push(structured_query(title, None));
        if author.is_some() {
            for variant in title_variants {
                queries.push(structured_query(variant, author));
            }
        }
        for variant in title_variants {
            queries.push(structured_query(variant, None));
        }
        for author_variant in author_variants {
            queries.push(structured_query(title, Some(author_variant)));
        }
        queries.push(free_text_query(title, author));

        for query in queries {
            let results = self.search_by_query(&query, FALLBACK_MAX_RESULTS).await?;
            if let Some(hit) = results.into_iter().next() {
                return Ok(Some(hit));
            }
        }

        Ok(None)
    }
}

// ==================== Provider API Response Types ====================

/// Top-level volumes search response.
#[derive(Debug, Deserialize)]
struct VolumesResponse {
    items: Option<Vec<VolumeItem>>,
}

/// One volume entry.
#[derive(Debug, Deserialize)]
struct VolumeItem {
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: Option<VolumeInfo>,
}

/// The `volumeInfo` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    description: Option<String>,
    categories: Option<Vec<String>>,
    published_date: Option<String>,
    image_links: Option<ImageLinks>,
    industry_identifiers: Option<Vec<IndustryIdentifier>>,
    page_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: Option<String>,
    identifier: Option<String>,
}

/// Normalizes one provider item; items without a title are dropped.
fn normalize_item(item: VolumeItem) -> Option<VolumeRecord> {
    let info = item.volume_info?;
    let title = info.title?;

    let author = info
        .authors
        .filter(|authors| !authors.is_empty())
        .map(|authors| authors.join(", "));

    let published_year = info
        .published_date
        .as_deref()
        .and_then(|date| date.get(..4))
        .and_then(|year| year.parse::<i32>().ok());

    let cover_url = info
        .image_links
        .and_then(|links| links.thumbnail.or(links.small_thumbnail));

    let isbn = pick_isbn(info.industry_identifiers.as_deref().unwrap_or(&[]));

    Some(VolumeRecord {
        volume_id: item.id,
        title,
        author,
        description: info.description,
        genres: info.categories.unwrap_or_default(),
        published_year,
        cover_url,
        isbn,
        page_count: info.page_count,
    })
}

/// Picks the best ISBN from identifier entries: ISBN-13 over ISBN-10.
fn pick_isbn(identifiers: &[IndustryIdentifier]) -> Option<String> {
    let find = |wanted: &str| {
        identifiers
            .iter()
            .find(|entry| entry.kind.as_deref() == Some(wanted))
            .and_then(|entry| entry.identifier.clone())
    };
    find("ISBN_13").or_else(|| find("ISBN_10"))
}

// ==================== VolumesClient ====================

/// HTTP client for the volumes API with pacing and 429 backoff.
pub struct VolumesClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    pacer: RequestPacer,
    backoff: BackoffPolicy,
    notifier: Arc<dyn Notifier>,
}

impl VolumesClient {
    /// Creates a client against the default provider base URL.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::ClientBuild`] if HTTP client construction fails.
    pub fn new() -> Result<Self, MetadataError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::ClientBuild`] if HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MetadataError> {
        let user_agent = format!("libris/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| MetadataError::ClientBuild(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: None,
            pacer: RequestPacer::default(),
            backoff: BackoffPolicy::default(),
            notifier: Arc::new(TracingNotifier),
        })
    }

    /// Sets the provider API key sent as a query parameter.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Overrides the minimum inter-request delay.
    #[must_use]
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.pacer = RequestPacer::new(min_delay);
        self
    }

    /// Overrides the 429 backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Overrides the operator notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn key_suffix(&self) -> String {
        self.api_key
            .as_deref()
            .map(|key| format!("&key={}", urlencoding::encode(key)))
            .unwrap_or_default()
    }

    /// Issues one paced GET, retrying 429s with backoff up to the ceiling.
    ///
    /// Returns `Ok(None)` for 404 so direct-id lookups can miss cleanly.
    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> Result<Option<T>, MetadataError> {
        let mut attempt: u32 = 0;

        loop {
            self.pacer.acquire().await;
            attempt += 1;

            debug!(url = %url, attempt, "provider request");
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);

                match self.backoff.delay_for(attempt, retry_after) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "provider rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => {
                        self.notifier
                            .notify(&format!(
                                "metadata provider rate limit persisted after {attempt} attempts ({context})"
                            ))
                            .await;
                        return Err(MetadataError::RateLimited { attempts: attempt });
                    }
                }
            }

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if !status.is_success() {
                return Err(MetadataError::HttpStatus {
                    status: status.as_u16(),
                    context: context.to_string(),
                });
            }

            let parsed = response
                .json::<T>()
                .await
                .map_err(|error| MetadataError::Parse(error.to_string()))?;
            return Ok(Some(parsed));
        }
    }
}

impl std::fmt::Debug for VolumesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumesClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MetadataSource for VolumesClient {
    #[instrument(skip(self), fields(query = %query))]
    async fn search_by_query(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<VolumeRecord>, MetadataError> {
        let url = format!(
            "{}/volumes?q={}&maxResults={}{}",
            self.base_url,
            urlencoding::encode(query),
            max_results,
            self.key_suffix()
        );

        let response: Option<VolumesResponse> = self.fetch(&url, "volume search").await?;
        let items = response
            .and_then(|body| body.items)
            .unwrap_or_default();

        Ok(items.into_iter().filter_map(normalize_item).collect())
    }

    #[instrument(skip(self), fields(volume_id = %id))]
    async fn get_by_id(&self, id: &str) -> Result<Option<VolumeRecord>, MetadataError> {
        let url = format!(
            "{}/volumes/{}{}",
            self.base_url,
            urlencoding::encode(id),
            // a lone key param still needs the `?`
            self.key_suffix().replacen('&', "?", 1)
        );

        let item: Option<VolumeItem> = self.fetch(&url, "volume lookup").await?;
        Ok(item.and_then(normalize_item))
    }
}
