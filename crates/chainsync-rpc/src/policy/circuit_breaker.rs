//! Three-state circuit breaker: Closed → Open → Half-Open.
//!
//! State transitions:
//! - `Closed` → `Open`:      `failure_threshold` consecutive failures
//! - `Open` → `Half-Open`:   `timeout` has elapsed (checked on admission)
//! - `Half-Open` → `Open`:   any probe fails
//! - `Half-Open` → `Closed`: `max_requests` probes succeed
//!
//! While `Closed`, the consecutive-failure counter also resets every
//! `interval` so stale failures from a past incident cannot trip the
//! breaker.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; failures are counted.
    Closed,
    /// All requests rejected without contacting the remote.
    Open,
    /// A bounded number of probe requests admitted.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Probe requests admitted in half-open before closing.
    pub max_requests: u32,
    /// Counter-reset period while closed.
    pub interval: Duration,
    /// How long to stay open before admitting probes.
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            max_requests: 5,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    probe_successes: u32,
    probes_admitted: u32,
    opened_at: Option<Instant>,
    closed_since: Instant,
}

/// Thread-safe circuit breaker, cheap to clone.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                probes_admitted: 0,
                opened_at: None,
                closed_since: Instant::now(),
            })),
        }
    }

    /// Ask the breaker whether a request may proceed. Also drives the
    /// Open→HalfOpen transition and the Closed-interval counter reset.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                if inner.closed_since.elapsed() >= self.config.interval {
                    inner.consecutive_failures = 0;
                    inner.closed_since = Instant::now();
                }
                true
            }
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_successes = 0;
                    inner.probes_admitted = 1;
                    tracing::info!("circuit breaker → half-open");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probes_admitted < self.config.max_requests {
                    inner.probes_admitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.max_requests {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.probe_successes = 0;
                    inner.probes_admitted = 0;
                    inner.opened_at = None;
                    inner.closed_since = Instant::now();
                    tracing::info!("circuit breaker → closed");
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker → open"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_successes = 0;
                inner.probes_admitted = 0;
                tracing::warn!("circuit breaker probe failed → open");
            }
            BreakerState::Open => {}
        }
    }

    /// Current state (without driving transitions).
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker").field("state", &self.state()).finish()
    }
}
