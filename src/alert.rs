//! Operator notification and failure-window alarming.
//!
//! Two escalation paths feed the [`Notifier`]: the metadata client when its
//! rate-limit retry ceiling is exhausted, and the evaluation-case log when
//! writes keep failing. The failure window is an owned component with an
//! injectable clock so it can be unit-tested without wall-clock sleeps.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, instrument};

/// Width of the sliding failure window.
const FAILURE_WINDOW_MINUTES: i64 = 60;

/// Failures inside the window before the alert fires.
const FAILURE_THRESHOLD: usize = 3;

/// Destination for operator-facing alerts.
///
/// The production deployment wires this to the chat platform; the default
/// implementation logs at `error` level.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one operator alert.
    async fn notify(&self, message: &str);
}

/// Default notifier that emits alerts through tracing.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, message: &str) {
        error!(alert = %message, "operator alert");
    }
}

/// Clock seam so the failure window is testable without sleeping.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used outside tests.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Sliding-window failure counter with a single-fire alert flag.
///
/// Records failure instants, drops those older than 60 minutes, and reports
/// an alert exactly once when the count reaches the threshold. The flag
/// re-arms when the windowed count falls back below the threshold.
pub struct FailureWindow<C: Clock> {
    clock: C,
    failures: VecDeque<DateTime<Utc>>,
    alerted: bool,
}

impl<C: Clock> FailureWindow<C> {
    /// Creates an empty window over the given clock.
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            failures: VecDeque::new(),
            alerted: false,
        }
    }

    /// Records one failure. Returns `true` exactly when this failure trips
    /// the threshold and the alert has not fired for the current burst.
    #[instrument(skip(self))]
    pub fn record_failure(&mut self) -> bool {
        let now = self.clock.now();
        self.failures.push_back(now);
        self.prune(now);

        if self.failures.len() >= FAILURE_THRESHOLD && !self.alerted {
            self.alerted = true;
            return true;
        }
        false
    }

    /// Returns the number of failures currently inside the window, re-arming
    /// the alert flag when the burst has drained.
    pub fn current_count(&mut self) -> usize {
        let now = self.clock.now();
        self.prune(now);
        self.failures.len()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::minutes(FAILURE_WINDOW_MINUTES);
        while self
            .failures
            .front()
            .is_some_and(|stamp| *stamp < cutoff)
        {
            self.failures.pop_front();
        }

        if self.failures.len() < FAILURE_THRESHOLD {
            self.alerted = false;
        }
    }
}
