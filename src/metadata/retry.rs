//! Rate-limit retry policy with exponential backoff.
//!
//! Only HTTP 429 is retried here; other failures surface immediately and
//! are handled per-item by the pipeline. Delays double from the base
//! (1 s, 2 s, 4 s, ...) up to the retry ceiling; a parseable Retry-After
//! header takes precedence when it asks for a longer wait.

use std::time::Duration;

use tracing::{debug, instrument, warn};

/// Default number of backoff retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Cap applied to any single delay, including Retry-After values.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Backoff configuration for 429 responses.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with a custom retry ceiling and base delay.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Creates a policy with a custom ceiling and the default base delay.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Returns the configured retry ceiling.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (1-indexed), or `None` once the
    /// ceiling is exhausted. `retry_after` is the parsed Retry-After header
    /// value, honored when it exceeds the computed backoff.
    #[instrument(skip(self))]
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Option<Duration> {
        if retry > self.max_retries {
            debug!(retry, ceiling = self.max_retries, "retry ceiling exhausted");
            return None;
        }

        // 1-indexed: first retry waits base_delay * 2^0
        let exponential = self.base_delay.saturating_mul(1 << (retry - 1));
        let mut delay = match retry_after {
            Some(server) if server > exponential => server,
            _ => exponential,
        };

        if delay > MAX_DELAY {
            warn!(
                delay_secs = delay.as_secs(),
                cap_secs = MAX_DELAY.as_secs(),
                "capping rate-limit delay"
            );
            delay = MAX_DELAY;
        }

        Some(delay)
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-date formats per RFC 7231. Returns
/// `None` for unparseable or negative values.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        return Some(Duration::from_secs(seconds as u64));
    }

    let datetime = httpdate::parse_http_date(header_value).ok()?;
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration),
        // Date in the past: no extra wait required
        Err(_) => Some(Duration::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== BackoffPolicy Tests ====================

    #[test]
    fn test_backoff_doubles_per_retry() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1, None), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2, None), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(3, None), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_backoff_ceiling_exhausts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(4, None), None);
    }

    #[test]
    fn test_backoff_custom_ceiling() {
        let policy = BackoffPolicy::with_max_retries(1);
        assert!(policy.delay_for(1, None).is_some());
        assert_eq!(policy.delay_for(2, None), None);
    }

    #[test]
    fn test_backoff_honors_longer_retry_after() {
        let policy = BackoffPolicy::default();
        let delay = policy.delay_for(1, Some(Duration::from_secs(10)));
        assert_eq!(delay, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_backoff_ignores_shorter_retry_after() {
        let policy = BackoffPolicy::default();
        let delay = policy.delay_for(3, Some(Duration::from_secs(1)));
        assert_eq!(delay, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_backoff_caps_excessive_retry_after() {
        let policy = BackoffPolicy::default();
        let delay = policy.delay_for(1, Some(Duration::from_secs(3600)));
        assert_eq!(delay, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_backoff_zero_retries_never_delays() {
        let policy = BackoffPolicy::with_max_retries(0);
        assert_eq!(policy.delay_for(1, None), None);
    }

    // ==================== parse_retry_after Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_retry_after_negative_and_invalid() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
    }
}
