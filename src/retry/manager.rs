//! Retry orchestration
//!
//! `execute_with_retry` composes the circuit breaker, the global rate
//! limiter and the backoff policy around an arbitrary async operation.
//! Retryable kinds are absorbed here and escalated only after the attempt
//! budget is exhausted; an open circuit short-circuits without issuing a
//! request.

use dashmap::DashMap;
use log::{debug, warn};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::circuit_breaker::CircuitBreaker;
use super::policy::RetryPolicy;
use super::rate_limiter::RateLimiter;
use crate::error::{CloneError, CloneResult};

/// Per-domain observability counters
#[derive(Debug, Default, Clone)]
pub struct DomainStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
}

/// Global observability counters
#[derive(Debug, Default)]
struct GlobalStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    circuit_rejections: AtomicU64,
}

/// Snapshot of the global counters
#[derive(Debug, Clone, Default)]
pub struct RetryStatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub circuit_rejections: u64,
}

/// Retry manager shared across a process
///
/// The circuit-breaker map is process-wide: one origin misbehaving in one
/// session is skipped by every session.
pub struct RetryManager {
    policy: RetryPolicy,
    circuit_breaker: Arc<CircuitBreaker>,
    rate_limiter: Arc<RateLimiter>,
    domain_stats: DashMap<String, DomainStats>,
    global: GlobalStats,
}

impl RetryManager {
    /// Create a manager with the given policy and limits
    #[must_use]
    pub fn new(
        policy: RetryPolicy,
        circuit_breaker: Arc<CircuitBreaker>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            policy,
            circuit_breaker,
            rate_limiter,
            domain_stats: DashMap::new(),
            global: GlobalStats::default(),
        }
    }

    /// Execute an operation with retry, rate limiting and circuit breaking.
    ///
    /// The operation receives the 1-based attempt index and the timeout it
    /// must honor for that attempt. Retry state is pure value flow: the
    /// operation returns `Err(kind)` and this loop decides whether another
    /// attempt happens.
    ///
    /// # Arguments
    /// * `domain` - Domain the operation targets (circuit-breaker key)
    /// * `op` - Factory invoked once per attempt
    pub async fn execute_with_retry<T, F, Fut>(&self, domain: &str, mut op: F) -> CloneResult<T>
    where
        F: FnMut(u32, Duration) -> Fut,
        Fut: Future<Output = CloneResult<T>>,
    {
        if !self.circuit_breaker.should_attempt(domain) {
            self.global.circuit_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(CloneError::CircuitOpen(domain.to_string()));
        }

        let mut last_error = CloneError::InternalInvariant("retry loop exited without attempts".to_string());

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.backoff_delay(attempt);
            if !delay.is_zero() {
                debug!("Retry backoff {delay:?} before attempt {attempt} for {domain}");
                tokio::time::sleep(delay).await;
            }

            // Between backoffs the circuit may have opened on other traffic.
            if attempt > 1 && !self.circuit_breaker.should_attempt(domain) {
                self.global.circuit_rejections.fetch_add(1, Ordering::Relaxed);
                return Err(CloneError::CircuitOpen(domain.to_string()));
            }

            let _slot = self.rate_limiter.acquire().await;

            self.bump(domain, |s| s.attempts += 1);
            self.global.attempts.fetch_add(1, Ordering::Relaxed);

            let timeout = self.policy.timeout_for_attempt(attempt);
            match op(attempt, timeout).await {
                Ok(value) => {
                    self.circuit_breaker.record_success(domain);
                    self.bump(domain, |s| s.successes += 1);
                    self.global.successes.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = self.policy.is_retryable(&err);
                    debug!(
                        "Attempt {attempt}/{} for {domain} failed ({}retryable): {err}",
                        self.policy.max_attempts,
                        if retryable { "" } else { "not " }
                    );

                    self.circuit_breaker.record_failure(domain, &err.to_string());
                    self.bump(domain, |s| s.failures += 1);
                    self.global.failures.fetch_add(1, Ordering::Relaxed);

                    if !retryable {
                        return Err(err);
                    }
                    if attempt < self.policy.max_attempts {
                        self.bump(domain, |s| s.retries += 1);
                        self.global.retries.fetch_add(1, Ordering::Relaxed);
                    }
                    last_error = err;
                }
            }
        }

        warn!(
            "Retry budget of {} attempts exhausted for {domain}: {last_error}",
            self.policy.max_attempts
        );
        Err(last_error)
    }

    /// The shared circuit breaker
    #[must_use]
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// The shared rate limiter
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Counters for one domain
    #[must_use]
    pub fn domain_stats(&self, domain: &str) -> Option<DomainStats> {
        self.domain_stats.get(domain).map(|r| r.value().clone())
    }

    /// Global counter snapshot
    #[must_use]
    pub fn stats(&self) -> RetryStatsSnapshot {
        RetryStatsSnapshot {
            attempts: self.global.attempts.load(Ordering::Relaxed),
            successes: self.global.successes.load(Ordering::Relaxed),
            failures: self.global.failures.load(Ordering::Relaxed),
            retries: self.global.retries.load(Ordering::Relaxed),
            circuit_rejections: self.global.circuit_rejections.load(Ordering::Relaxed),
        }
    }

    fn bump(&self, domain: &str, f: impl FnOnce(&mut DomainStats)) {
        let mut entry = self.domain_stats.entry(domain.to_string()).or_default();
        f(entry.value_mut());
    }
}
