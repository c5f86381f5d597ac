//! Request pacing for the metadata provider.
//!
//! The provider quota is global per API key, so pacing is global per client
//! instance rather than per host: a minimum inter-request delay enforced
//! with a wait-then-stamp pattern. Requests serialize on the mutex, making
//! the client effectively single-outstanding-request.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Default minimum delay between provider requests.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(200);

/// Wait-then-stamp pacer shared by all requests of one client instance.
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    /// `None` until the first request; the first request is immediate.
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Creates a pacer with the given minimum inter-request delay.
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    /// Returns the configured minimum delay.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Waits until the minimum delay since the previous request has passed,
    /// then stamps the current instant. The first call returns immediately.
    #[instrument(skip(self))]
    pub async fn acquire(&self) {
        let mut last_request = self.last_request.lock().await;

        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                let wait = self.min_delay.saturating_sub(elapsed);
                debug!(wait_ms = wait.as_millis(), "pacing provider request");
                tokio::time::sleep(wait).await;
            }
        } else {
            debug!("first provider request - no delay");
        }

        *last_request = Some(Instant::now());
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}
