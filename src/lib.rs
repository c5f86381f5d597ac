//! Libris Core Library
//!
//! This library provides the core functionality for the libris tool, which
//! turns noisy natural-language book mentions (from chat exports or a live
//! message stream) into a deduplicated, confidently-matched catalog of
//! `Book` and `Review` records.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`similarity`] - Normalized string similarity scoring
//! - [`isbn`] - ISBN format validation
//! - [`export`] - Chat export parsing
//! - [`metadata`] - External bibliographic metadata source client
//! - [`matching`] - Local/external book matching engine
//! - [`store`] - Pipeline stage store and catalog persistence
//! - [`pipeline`] - Pipeline stages (extract, process, enrich, review, finalize)
//! - [`caselog`] - Durable evaluation-case logging for unmatched reviews
//! - [`alert`] - Operator notification and failure-window alarming

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod caselog;
pub mod db;
pub mod export;
pub mod isbn;
pub mod matching;
pub mod metadata;
pub mod pipeline;
pub mod similarity;
pub mod store;

// Re-export commonly used types
pub use alert::{Clock, FailureWindow, Notifier, SystemClock, TracingNotifier};
pub use caselog::{EvaluationCase, EvaluationCaseLog};
pub use db::Database;
pub use matching::{CatalogMatch, EnrichedMatches, MATCH_THRESHOLD, MatchSource, MatchingEngine};
pub use metadata::{MetadataError, MetadataSource, VolumeRecord, VolumesClient};
pub use similarity::{normalize, similarity};
pub use store::{
    Book, Confidence, EnrichmentStatus, ExtractionStatus, MessageStatus, PipelineStore, Review,
    StagedEnrichment, StagedExtraction, StagedMessage, StoreError,
};
