//! Pipeline stage store and catalog persistence.
//!
//! Every pipeline entity is a durable row whose `status` column is both
//! state and work-queue discriminator. Each stage operation is a
//! status-filtered read plus an atomic status-transition write; the legal
//! transitions live in [`transitions`] as pure functions the store consults
//! before any UPDATE.
//!
//! # Overview
//!
//! - [`PipelineStore`] - Main interface over the staging tables and catalog
//! - [`StagedMessage`] / [`StagedExtraction`] / [`StagedEnrichment`] - Stage rows
//! - [`Book`] / [`Review`] - Durable catalog entities
//! - [`StoreError`] - Operation error types
//!
//! # Example
//!
//! ```ignore
//! use libris_core::store::{PipelineStore, NewStagedMessage};
//! use libris_core::Database;
//!
//! let db = Database::new(Path::new("libris.db")).await?;
//! let store = PipelineStore::new(db);
//! let id = store.insert_message(&NewStagedMessage { /* ... */ }).await?;
//! ```

mod book;
mod enrichment;
mod error;
mod extraction;
mod message;
mod review;
pub mod transitions;

pub use book::{Book, NewBook};
pub use enrichment::{EnrichmentFilter, EnrichmentStatus, NewStagedEnrichment, StagedEnrichment};
pub use error::{StoreDbErrorKind, StoreError};
pub use extraction::{
    AltMention, Confidence, ExtractionFilter, ExtractionStatus, NewStagedExtraction,
    StagedExtraction,
};
pub use message::{MessageStatus, NewStagedMessage, StagedMessage};
pub use review::{NewReview, Review};
pub use transitions::{EnrichmentAction, ExtractionAction, MessageAction};

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise
/// [`StoreError::RowNotFound`].
fn check_affected(entity: &'static str, id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::RowNotFound { entity, id })
    } else {
        Ok(())
    }
}

/// Store for pipeline staging tables and the durable catalog.
///
/// Single-writer per pipeline run; concurrent runs against the same status
/// bucket are not supported.
#[derive(Debug, Clone)]
pub struct PipelineStore {
    db: Database,
}

impl PipelineStore {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }
}
