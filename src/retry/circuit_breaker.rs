//! Circuit breaker for domain-level failure detection
//!
//! Tracks per-domain health across three states:
//! - Closed: normal operation, requests proceed
//! - Open: too many failures, requests short-circuit to `CircuitOpen`
//! - `HalfOpen`: probing after the cooldown period
//!
//! The circuit opens only when both conditions hold: consecutive failures
//! reached the threshold AND the overall failure rate for the domain
//! exceeds one half. A single success in `HalfOpen` closes the circuit.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests proceed
    Closed,
    /// Probing after cooldown - limited requests allowed
    HalfOpen,
    /// Failing - requests are short-circuited
    Open,
}

/// Health tracking for a single domain
#[derive(Debug, Clone)]
pub struct DomainHealth {
    /// Consecutive failures without an intervening success
    pub consecutive_failures: u32,
    /// Total attempts recorded
    pub total_attempts: u32,
    /// Total successes recorded
    pub total_successes: u32,
    /// Last successful request
    pub last_success: Option<Instant>,
    /// When the circuit last opened
    pub last_failure: Option<Instant>,
    /// Current state
    pub state: CircuitState,
}

impl DomainHealth {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            total_attempts: 0,
            total_successes: 0,
            last_success: None,
            last_failure: None,
            state: CircuitState::Closed,
        }
    }

    /// Fraction of attempts that failed, in [0,1]
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        let failures = self.total_attempts.saturating_sub(self.total_successes);
        f64::from(failures) / f64::from(self.total_attempts)
    }
}

/// Per-domain circuit breaker with atomic state transitions
pub struct CircuitBreaker {
    domains: DashMap<String, DomainHealth>,
    /// Consecutive failures required before the circuit can open
    failure_threshold: u32,
    /// Cooldown before an open circuit allows a probe
    open_timeout: Duration,
}

impl CircuitBreaker {
    /// Create a breaker with the given threshold and cooldown
    #[must_use]
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            domains: DashMap::new(),
            failure_threshold,
            open_timeout,
        }
    }

    /// Check whether a request to the domain should proceed.
    ///
    /// Returns false while the circuit is open; triggers the Open → HalfOpen
    /// transition once the cooldown has elapsed.
    pub fn should_attempt(&self, domain: &str) -> bool {
        let mut health = self
            .domains
            .entry(domain.to_string())
            .or_insert_with(DomainHealth::new);

        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if let Some(opened) = health.last_failure
                    && opened.elapsed() >= self.open_timeout
                {
                    health.state = CircuitState::HalfOpen;
                    info!(
                        "Circuit breaker HALF-OPEN for {domain} after {:?} cooldown",
                        opened.elapsed()
                    );
                    return true;
                }
                false
            }
        }
    }

    /// Record a successful request.
    ///
    /// Resets the consecutive-failure count; one success in `HalfOpen`
    /// closes the circuit.
    pub fn record_success(&self, domain: &str) {
        let mut health = self
            .domains
            .entry(domain.to_string())
            .or_insert_with(DomainHealth::new);

        health.consecutive_failures = 0;
        health.total_attempts += 1;
        health.total_successes += 1;
        health.last_success = Some(Instant::now());

        if health.state == CircuitState::HalfOpen {
            health.state = CircuitState::Closed;
            info!("Circuit breaker CLOSED for {domain}");
        }
    }

    /// Record a failed request.
    ///
    /// A failure in `HalfOpen` re-opens immediately. In Closed state the
    /// circuit opens once consecutive failures reach the threshold and the
    /// domain's failure rate exceeds 0.5.
    pub fn record_failure(&self, domain: &str, error: &str) {
        let mut health = self
            .domains
            .entry(domain.to_string())
            .or_insert_with(DomainHealth::new);

        health.consecutive_failures += 1;
        health.total_attempts += 1;

        let should_open = match health.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => {
                health.consecutive_failures >= self.failure_threshold
                    && health.failure_rate() > 0.5
            }
            CircuitState::Open => false,
        };

        if should_open {
            health.state = CircuitState::Open;
            health.last_failure = Some(Instant::now());
            warn!(
                "Circuit breaker OPEN for {domain} after {} consecutive failures (rate {:.2}). Last error: {error}",
                health.consecutive_failures,
                health.failure_rate()
            );
        } else if health.state != CircuitState::Open {
            health.last_failure = Some(Instant::now());
            debug!(
                "Circuit breaker failure for {domain} ({}/{}): {error}",
                health.consecutive_failures, self.failure_threshold
            );
        }
    }

    /// Health snapshot for a domain, None if unseen
    #[must_use]
    pub fn get_health(&self, domain: &str) -> Option<DomainHealth> {
        self.domains.get(domain).map(|r| r.value().clone())
    }

    /// Domains currently in Open state
    #[must_use]
    pub fn open_domains(&self) -> Vec<String> {
        self.domains
            .iter()
            .filter(|e| e.value().state == CircuitState::Open)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Count of domains in each state (closed, half-open, open)
    #[must_use]
    pub fn state_counts(&self) -> (usize, usize, usize) {
        let mut closed = 0;
        let mut half_open = 0;
        let mut open = 0;
        for entry in self.domains.iter() {
            match entry.value().state {
                CircuitState::Closed => closed += 1,
                CircuitState::HalfOpen => half_open += 1,
                CircuitState::Open => open += 1,
            }
        }
        (closed, half_open, open)
    }
}
