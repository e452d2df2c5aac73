//! Retry policy: error classification, backoff and attempt timeouts
//!
//! Retry state is expressed as explicit values, never control-flow
//! exceptions: the manager asks this module whether an error is retryable
//! and how long to wait, then sleeps and retries.

use rand::Rng;
use std::time::Duration;

use crate::error::CloneError;

/// HTTP statuses worth retrying
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504, 520, 521, 522, 523, 524];

/// Tunable retry parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts including the first
    pub max_attempts: u32,
    /// First backoff delay
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    /// Apply ±10% jitter to each delay
    pub jitter: bool,
    /// Timeout for the first attempt
    pub attempt_timeout: Duration,
    /// Absolute ceiling on any attempt timeout
    pub attempt_timeout_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
            attempt_timeout: Duration::from_secs(30),
            attempt_timeout_ceiling: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Whether an error kind is eligible for another attempt
    #[must_use]
    pub fn is_retryable(&self, error: &CloneError) -> bool {
        match error {
            CloneError::Network(kind) => !matches!(kind, crate::error::NetworkKind::TooManyRedirects),
            CloneError::Timeout(_) => true,
            CloneError::HttpStatus(code) => RETRYABLE_STATUSES.contains(code),
            CloneError::RateLimited(_) => true,
            _ => false,
        }
    }

    /// Backoff before attempt `attempt` (1-based; attempt 1 has no delay).
    ///
    /// Exponential doubling from the base, capped, with optional ±10%
    /// jitter to avoid synchronized retries.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 2).min(16);
        let raw = self
            .base_delay
            .saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
        let capped = raw.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let factor = rand::rng().random_range(0.9..=1.1);
        capped.mul_f64(factor).min(self.max_delay)
    }

    /// Timeout for attempt `attempt` (1-based).
    ///
    /// Grows modestly with the attempt index (half the base per extra
    /// attempt) up to the absolute ceiling, giving slow-but-alive servers a
    /// longer window on later attempts.
    #[must_use]
    pub fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        let extra = self
            .attempt_timeout
            .mul_f64(0.5 * f64::from(attempt.saturating_sub(1)));
        (self.attempt_timeout + extra).min(self.attempt_timeout_ceiling)
    }
}
