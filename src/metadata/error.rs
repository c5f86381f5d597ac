//! Error types for metadata source operations.

use thiserror::Error;

/// Errors produced by the metadata source client.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// HTTP client construction failed.
    #[error("failed to build metadata HTTP client: {0}")]
    ClientBuild(String),

    /// Network-level request failure (DNS, TLS, timeout, connect).
    #[error(
        "metadata provider request failed: {0}\n  Suggestion: Check your network connection, then rerun"
    )]
    Request(#[from] reqwest::Error),

    /// Provider returned an unexpected HTTP status.
    #[error("metadata provider returned HTTP {status} for {context}")]
    HttpStatus {
        /// HTTP status code returned.
        status: u16,
        /// What was being requested.
        context: String,
    },

    /// Provider response could not be parsed.
    #[error("unexpected metadata provider response format: {0}")]
    Parse(String),

    /// Rate-limit retry ceiling exhausted. Fatal for the current item; the
    /// pipeline must not retry it within the same run.
    #[error(
        "metadata provider rate limit persisted after {attempts} attempts\n  Suggestion: Wait a few minutes before re-running the stage"
    )]
    RateLimited {
        /// Total attempts made, including the initial request.
        attempts: u32,
    },
}

impl MetadataError {
    /// True when this error means the rate-limit ceiling was exhausted.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message_mentions_attempts() {
        let err = MetadataError::RateLimited { attempts: 4 };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("Suggestion"));
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_http_status_message() {
        let err = MetadataError::HttpStatus {
            status: 503,
            context: "volume search".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("volume search"));
        assert!(!err.is_rate_limited());
    }
}
