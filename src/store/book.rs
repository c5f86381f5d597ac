//! Catalog book rows.

use std::fmt;

use sqlx::{FromRow, Row};
use tracing::instrument;

use crate::metadata::VolumeRecord;

use super::{PipelineStore, Result};

/// One catalog entry. Created once per distinct work; never duplicated for
/// the same external id.
#[derive(Debug, Clone, FromRow)]
pub struct Book {
    /// Unique identifier.
    pub id: i64,
    /// Book title.
    pub title: String,
    /// Display author string.
    pub author: Option<String>,
    /// Provider external id; synthetic `manual-…` ids for manual entries.
    pub volume_id: Option<String>,
    /// Cover thumbnail URL.
    pub cover_url: Option<String>,
    /// Genre labels as a JSON array.
    pub genres: Option<String>,
    /// Publication year.
    pub published_year: Option<i64>,
    /// Back-cover description.
    pub description: Option<String>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Page count.
    pub page_count: Option<i64>,
    /// When the row was created.
    pub created_at: String,
}

impl Book {
    /// Parses genre labels from the JSON column.
    ///
    /// Returns an empty vector when absent or invalid.
    #[must_use]
    pub fn parse_genres(&self) -> Vec<String> {
        let Some(json) = &self.genres else {
            return Vec::new();
        };
        serde_json::from_str(json).unwrap_or_default()
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.author {
            Some(author) => write!(f, "{} by {}", self.title, author),
            None => write!(f, "{}", self.title),
        }
    }
}

/// Insert payload for a new catalog book.
#[derive(Debug, Clone)]
pub struct NewBook<'a> {
    /// Book title.
    pub title: &'a str,
    /// Display author string.
    pub author: Option<&'a str>,
    /// Provider external id.
    pub volume_id: Option<&'a str>,
    /// Cover thumbnail URL.
    pub cover_url: Option<&'a str>,
    /// Genre labels.
    pub genres: &'a [String],
    /// Publication year.
    pub published_year: Option<i32>,
    /// Back-cover description.
    pub description: Option<&'a str>,
    /// ISBN.
    pub isbn: Option<&'a str>,
    /// Page count.
    pub page_count: Option<i64>,
}

impl<'a> NewBook<'a> {
    /// Builds an insert payload from a provider record.
    #[must_use]
    pub fn from_record(record: &'a VolumeRecord) -> Self {
        Self {
            title: &record.title,
            author: record.author.as_deref(),
            volume_id: Some(&record.volume_id),
            cover_url: record.cover_url.as_deref(),
            genres: &record.genres,
            published_year: record.published_year,
            description: record.description.as_deref(),
            isbn: record.isbn.as_deref(),
            page_count: record.page_count,
        }
    }
}

impl PipelineStore {
    /// Inserts a catalog book.
    ///
    /// # Errors
    ///
    /// Returns a constraint-classified [`super::StoreError`] when the
    /// external id already exists in the catalog.
    #[instrument(skip(self, book), fields(title = %book.title))]
    pub async fn insert_book(&self, book: &NewBook<'_>) -> Result<i64> {
        let genres_json = if book.genres.is_empty() {
            None
        } else {
            Some(serde_json::to_string(book.genres)?)
        };

        let result = sqlx::query(
            r"INSERT INTO books (
                title,
                author,
                volume_id,
                cover_url,
                genres,
                published_year,
                description,
                isbn,
                page_count
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(book.title)
        .bind(book.author)
        .bind(book.volume_id)
        .bind(book.cover_url)
        .bind(genres_json)
        .bind(book.published_year)
        .bind(book.description)
        .bind(book.isbn)
        .bind(book.page_count)
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Gets a book by ID.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(r"SELECT * FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(book)
    }

    /// Finds a book by its provider external id.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn find_book_by_volume_id(&self, volume_id: &str) -> Result<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(r"SELECT * FROM books WHERE volume_id = ?")
            .bind(volume_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(book)
    }

    /// Returns the whole catalog. A full scan is acceptable at this
    /// system's scale; matching would need an index beyond it.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn all_books(&self) -> Result<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(r"SELECT * FROM books ORDER BY id ASC")
            .fetch_all(self.db.pool())
            .await?;

        Ok(books)
    }

    /// Counts catalog books.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_books(&self) -> Result<i64> {
        let result = sqlx::query(r"SELECT COUNT(*) as count FROM books")
            .fetch_one(self.db.pool())
            .await?;

        Ok(result.get("count"))
    }
}
