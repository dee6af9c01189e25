//! Retry policy for transient transport failures
//!
//! The sync loop retries timeouts and disconnects forever by default, waiting
//! `base_delay × multiplier^(n-1)` (capped) after the n-th consecutive
//! failure. A success resets the count.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay after the first failure, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor between consecutive failures (1.0 keeps the delay fixed)
    pub backoff_multiplier: f64,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_consecutive_failures: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 300_000, // 5 minutes
            backoff_multiplier: 1.0,
            max_consecutive_failures: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval policy
    pub fn fixed(delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            ..Self::default()
        }
    }

    /// Delay before retrying after the `attempt`-th consecutive failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.max(1.0);
        let delay = self.base_delay_ms as f64 * multiplier.powi(exponent);
        let capped = if delay.is_finite() {
            (delay as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };
        Duration::from_millis(capped)
    }

    /// Whether `consecutive_failures` exceeds the configured bound
    pub fn exhausted(&self, consecutive_failures: u32) -> bool {
        self.max_consecutive_failures
            .is_some_and(|max| consecutive_failures > max)
    }
}

/// What to do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again
    Retry {
        /// Consecutive failures so far
        attempt: u32,
        /// How long to wait
        delay: Duration,
    },
    /// Stop retrying
    GiveUp {
        /// Consecutive failures so far
        attempts: u32,
    },
}

/// Tracks consecutive failures against a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    consecutive_failures: u32,
}

impl Backoff {
    /// Start with no recorded failures
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    /// Record a failure and decide whether to retry
    pub fn record_failure(&mut self) -> RetryDecision {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.policy.exhausted(self.consecutive_failures) {
            RetryDecision::GiveUp {
                attempts: self.consecutive_failures,
            }
        } else {
            RetryDecision::Retry {
                attempt: self.consecutive_failures,
                delay: self.policy.delay_for(self.consecutive_failures),
            }
        }
    }

    /// Reset after a successful call
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Consecutive failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
