//! External bibliographic metadata source.
//!
//! This module abstracts the metadata provider behind [`MetadataSource`]:
//! search-by-query, get-by-id, search-by-ISBN, and a cascading
//! multi-strategy search. The concrete [`VolumesClient`] speaks the
//! provider's volumes API with global request pacing and 429 backoff.
//!
//! # Overview
//!
//! - [`VolumeRecord`] - Normalized search result
//! - [`MetadataSource`] - Provider trait with the fallback cascade
//! - [`VolumesClient`] - HTTP implementation
//! - [`RequestPacer`] - Wait-then-stamp inter-request pacing
//! - [`BackoffPolicy`] - Exponential 429 backoff with retry ceiling
//! - [`MetadataError`] - Operation error types

mod client;
mod error;
mod pacer;
mod retry;

pub use client::{MetadataSource, VolumeRecord, VolumesClient, free_text_query, structured_query};
pub use error::MetadataError;
pub use pacer::{DEFAULT_MIN_DELAY, RequestPacer};
pub use retry::{BackoffPolicy, DEFAULT_MAX_RETRIES, parse_retry_after};
