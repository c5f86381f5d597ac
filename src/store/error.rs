//! Error types for pipeline store operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for store/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/foreign-key/check/not-null).
    ConstraintViolation,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl StoreDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                let code = database_error.code();
                if matches!(code.as_deref(), Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")) {
                    return Self::BusyOrLocked;
                }
                if database_error.is_unique_violation()
                    || database_error.is_foreign_key_violation()
                    || database_error.is_check_violation()
                    || code
                        .as_deref()
                        .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
                {
                    return Self::ConstraintViolation;
                }
                Self::Other
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StoreDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// Errors that can occur during pipeline store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling.
        kind: StoreDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Expected row not found.
    #[error(
        "{entity} not found: id {id}\n  Suggestion: The row may have been removed or the ID is incorrect"
    )]
    RowNotFound {
        /// Entity name (staged message, enrichment, ...).
        entity: &'static str,
        /// The missing surrogate key.
        id: i64,
    },

    /// A status transition the state machine does not allow.
    #[error("invalid {entity} transition: {from} -> {action}")]
    InvalidTransition {
        /// Entity name.
        entity: &'static str,
        /// Current status.
        from: &'static str,
        /// Requested action.
        action: &'static str,
    },

    /// Serialized payload column could not be encoded.
    #[error("payload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: StoreDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<StoreDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True when the failure is a uniqueness/constraint violation.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        self.database_kind() == Some(StoreDbErrorKind::ConstraintViolation)
    }
}
