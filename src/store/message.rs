//! Staged message rows - inbound review candidates awaiting extraction.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row};
use tracing::instrument;

use super::transitions::{MessageAction, message_transition};
use super::{PipelineStore, Result, StoreError, check_affected};

/// Status of a staged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting for the extraction stage.
    Pending,
    /// An extraction row exists for this message.
    Extracted,
    /// The extractor failed; retained for retry or inspection.
    Failed,
    /// Excluded by an operator.
    Skipped,
}

impl MessageStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracted => "extracted",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// All statuses, for status reporting.
    #[must_use]
    pub fn all() -> [Self; 4] {
        [Self::Pending, Self::Extracted, Self::Failed, Self::Skipped]
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "extracted" => Ok(Self::Extracted),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("invalid message status: {s}")),
        }
    }
}

/// One staged inbound review candidate.
#[derive(Debug, Clone, FromRow)]
pub struct StagedMessage {
    /// Unique identifier.
    pub id: i64,
    /// Stable sender identifier from the source platform.
    pub source_user_id: String,
    /// Message id within the source chat.
    pub source_message_id: String,
    /// Sender display name at observation time.
    pub display_name: Option<String>,
    /// Raw review text.
    pub text: String,
    /// Source chat identifier.
    pub source_chat_id: String,
    /// When the message was observed (exporter timestamp).
    pub observed_at: String,
    /// Current status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// When the row was created.
    pub created_at: String,
    /// When the row was last updated.
    pub updated_at: String,
}

impl StagedMessage {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Pending` if the status string is invalid.
    #[must_use]
    pub fn status(&self) -> MessageStatus {
        self.status_str.parse().unwrap_or(MessageStatus::Pending)
    }
}

impl fmt::Display for StagedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StagedMessage {{ id: {}, source: {}/{}, status: {} }}",
            self.id,
            self.source_user_id,
            self.source_message_id,
            self.status()
        )
    }
}

/// Insert payload for a new staged message.
#[derive(Debug, Clone)]
pub struct NewStagedMessage<'a> {
    /// Stable sender identifier.
    pub source_user_id: &'a str,
    /// Message id within the source chat.
    pub source_message_id: &'a str,
    /// Sender display name.
    pub display_name: Option<&'a str>,
    /// Raw review text.
    pub text: &'a str,
    /// Source chat identifier.
    pub source_chat_id: &'a str,
    /// Observation timestamp.
    pub observed_at: &'a str,
}

impl PipelineStore {
    /// Stages a new inbound message with pending status.
    ///
    /// # Errors
    ///
    /// Returns a constraint-classified [`StoreError`] when the
    /// `(source_user_id, source_message_id)` idempotency key already exists.
    #[instrument(skip(self, message), fields(source = %message.source_user_id, message_id = %message.source_message_id))]
    pub async fn insert_message(&self, message: &NewStagedMessage<'_>) -> Result<i64> {
        let result = sqlx::query(
            r"INSERT INTO staged_messages (
                source_user_id,
                source_message_id,
                display_name,
                text,
                source_chat_id,
                observed_at,
                status
              )
              VALUES (?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(message.source_user_id)
        .bind(message.source_message_id)
        .bind(message.display_name)
        .bind(message.text)
        .bind(message.source_chat_id)
        .bind(message.observed_at)
        .bind(MessageStatus::Pending.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Checks whether a staged message already carries the idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn message_exists(
        &self,
        source_user_id: &str,
        source_message_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"SELECT COUNT(*) as count FROM staged_messages
              WHERE source_user_id = ? AND source_message_id = ?",
        )
        .bind(source_user_id)
        .bind(source_message_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get::<i64, _>("count") > 0)
    }

    /// Gets a staged message by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_message(&self, id: i64) -> Result<Option<StagedMessage>> {
        let message =
            sqlx::query_as::<_, StagedMessage>(r"SELECT * FROM staged_messages WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(message)
    }

    /// Returns messages in a status, oldest first, optionally limited.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_messages_by_status(
        &self,
        status: MessageStatus,
        limit: Option<i64>,
    ) -> Result<Vec<StagedMessage>> {
        let messages = sqlx::query_as::<_, StagedMessage>(
            r"SELECT * FROM staged_messages
              WHERE status = ?
              ORDER BY created_at ASC, id ASC
              LIMIT ?",
        )
        .bind(status.as_str())
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(self.db.pool())
        .await?;

        Ok(messages)
    }

    /// Counts messages by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_messages_by_status(&self, status: MessageStatus) -> Result<i64> {
        let result =
            sqlx::query(r"SELECT COUNT(*) as count FROM staged_messages WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(self.db.pool())
                .await?;

        Ok(result.get("count"))
    }

    /// Applies a validated status transition to a staged message.
    ///
    /// The row's current status participates in the WHERE clause so the
    /// read-validate-write acts as a single statement.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RowNotFound`] when the message is missing and
    /// [`StoreError::InvalidTransition`] when the state machine rejects the
    /// action.
    #[instrument(skip(self), fields(action = action.as_str()))]
    pub async fn transition_message(&self, id: i64, action: MessageAction) -> Result<MessageStatus> {
        let message = self
            .get_message(id)
            .await?
            .ok_or(StoreError::RowNotFound {
                entity: "staged message",
                id,
            })?;

        let current = message.status();
        let next = message_transition(current, action).ok_or(StoreError::InvalidTransition {
            entity: "staged message",
            from: current.as_str(),
            action: action.as_str(),
        })?;

        let result = sqlx::query(
            r"UPDATE staged_messages
              SET status = ?, updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(id)
        .bind(current.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected("staged message", id, result.rows_affected())?;
        Ok(next)
    }
}
