//! Finalized review rows.

use sqlx::{FromRow, Row};
use tracing::instrument;

use super::{PipelineStore, Result};

/// One finalized review, optionally linked to a catalog book. Orphaned
/// reviews (no confident match) are valid rows.
#[derive(Debug, Clone, FromRow)]
pub struct Review {
    /// Unique identifier.
    pub id: i64,
    /// Matched catalog book, when one exists.
    pub book_id: Option<i64>,
    /// Stable sender identifier from the source platform.
    pub source_user_id: String,
    /// Message id within the source chat.
    pub source_message_id: String,
    /// Review text.
    pub text: String,
    /// Sentiment label from the external classifier.
    pub sentiment: Option<String>,
    /// When the review was written.
    pub reviewed_at: String,
    /// When the row was created.
    pub created_at: String,
}

/// Insert payload for a new review.
#[derive(Debug, Clone)]
pub struct NewReview<'a> {
    /// Matched catalog book.
    pub book_id: Option<i64>,
    /// Stable sender identifier.
    pub source_user_id: &'a str,
    /// Message id within the source chat.
    pub source_message_id: &'a str,
    /// Review text.
    pub text: &'a str,
    /// Sentiment label.
    pub sentiment: Option<&'a str>,
    /// When the review was written.
    pub reviewed_at: &'a str,
}

impl PipelineStore {
    /// Inserts a finalized review.
    ///
    /// # Errors
    ///
    /// Returns a constraint-classified [`super::StoreError`] when a review
    /// with the same source identifiers already exists.
    #[instrument(skip(self, review), fields(source = %review.source_user_id, message_id = %review.source_message_id))]
    pub async fn insert_review(&self, review: &NewReview<'_>) -> Result<i64> {
        let result = sqlx::query(
            r"INSERT INTO reviews (
                book_id,
                source_user_id,
                source_message_id,
                text,
                sentiment,
                reviewed_at
              )
              VALUES (?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(review.book_id)
        .bind(review.source_user_id)
        .bind(review.source_message_id)
        .bind(review.text)
        .bind(review.sentiment)
        .bind(review.reviewed_at)
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Checks whether a finalized review already carries the idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn review_exists(
        &self,
        source_user_id: &str,
        source_message_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"SELECT COUNT(*) as count FROM reviews
              WHERE source_user_id = ? AND source_message_id = ?",
        )
        .bind(source_user_id)
        .bind(source_message_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get::<i64, _>("count") > 0)
    }

    /// Returns reviews for a catalog book.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn reviews_for_book(&self, book_id: i64) -> Result<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            r"SELECT * FROM reviews WHERE book_id = ? ORDER BY reviewed_at ASC",
        )
        .bind(book_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(reviews)
    }

    /// Counts finalized reviews.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_reviews(&self) -> Result<i64> {
        let result = sqlx::query(r"SELECT COUNT(*) as count FROM reviews")
            .fetch_one(self.db.pool())
            .await?;

        Ok(result.get("count"))
    }
}
