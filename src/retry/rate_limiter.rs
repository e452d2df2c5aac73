//! Global request rate limiting
//!
//! A token-bucket bounds requests per second while a FIFO-fair semaphore
//! bounds concurrent in-flight requests. `acquire` blocks until both a
//! token and an in-flight slot are available; the returned guard releases
//! the slot on drop.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Fixed-point scaling for sub-token precision
const TOKEN_SCALE: u64 = 1000;

/// Decision for a non-blocking rate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request is allowed to proceed
    Allow,
    /// Request should wait before retrying
    Deny { retry_after: Duration },
}

/// Token bucket state behind the mutex
struct BucketState {
    /// Available tokens scaled by `TOKEN_SCALE`
    tokens: u64,
    /// Last refill instant
    last_refill: Instant,
}

/// Rate limiter bounding requests-per-second and in-flight concurrency
pub struct RateLimiter {
    bucket: Option<Mutex<BucketState>>,
    /// Scaled tokens added per second
    rate_scaled: u64,
    /// Bucket capacity (scaled); one second of burst
    max_tokens: u64,
    in_flight: Arc<Semaphore>,
}

impl RateLimiter {
    /// Create a limiter.
    ///
    /// # Arguments
    /// * `rate_rps` - Requests per second; None disables the rate bound
    /// * `max_concurrent` - Maximum in-flight requests
    #[must_use]
    pub fn new(rate_rps: Option<f64>, max_concurrent: usize) -> Self {
        let rate_scaled = rate_rps
            .filter(|r| *r > 0.0)
            .map_or(0, |r| (r * TOKEN_SCALE as f64) as u64);
        let max_tokens = rate_scaled.max(TOKEN_SCALE);

        Self {
            bucket: (rate_scaled > 0).then(|| {
                Mutex::new(BucketState {
                    tokens: max_tokens,
                    last_refill: Instant::now(),
                })
            }),
            rate_scaled,
            max_tokens,
            in_flight: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Non-blocking check: consume a token if available.
    pub async fn check(&self) -> RateLimitDecision {
        let Some(bucket) = &self.bucket else {
            return RateLimitDecision::Allow;
        };

        let mut state = bucket.lock().await;
        self.refill(&mut state);

        if state.tokens >= TOKEN_SCALE {
            state.tokens -= TOKEN_SCALE;
            RateLimitDecision::Allow
        } else {
            let needed = TOKEN_SCALE - state.tokens;
            let nanos = if self.rate_scaled > 0 {
                needed.saturating_mul(1_000_000_000) / self.rate_scaled
            } else {
                1_000_000
            };
            RateLimitDecision::Deny {
                retry_after: Duration::from_nanos(nanos),
            }
        }
    }

    /// Block until a token and an in-flight slot are available.
    ///
    /// Waiters queue FIFO on the semaphore; the token wait sleeps for the
    /// bucket's own estimate, so waiters do not spin.
    pub async fn acquire(&self) -> InFlightGuard {
        // Semaphore acquisition is FIFO-fair in tokio; the permit also
        // bounds concurrency while we wait for a token.
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .expect("BUG: rate limiter semaphore is never closed");

        loop {
            match self.check().await {
                RateLimitDecision::Allow => return InFlightGuard { _permit: permit },
                RateLimitDecision::Deny { retry_after } => {
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    /// Currently available in-flight slots
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.in_flight.available_permits()
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed();
        let added = (elapsed.as_nanos() as u64).saturating_mul(self.rate_scaled) / 1_000_000_000;
        if added > 0 {
            state.tokens = state.tokens.saturating_add(added).min(self.max_tokens);
            state.last_refill = Instant::now();
        }
    }
}

/// Guard holding one in-flight slot; released on drop
pub struct InFlightGuard {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_allowed_second_denied() {
        let limiter = RateLimiter::new(Some(1.0), 4);
        assert_eq!(limiter.check().await, RateLimitDecision::Allow);
        assert!(matches!(
            limiter.check().await,
            RateLimitDecision::Deny { .. }
        ));
    }

    #[tokio::test]
    async fn disabled_rate_always_allows() {
        let limiter = RateLimiter::new(None, 4);
        for _ in 0..100 {
            assert_eq!(limiter.check().await, RateLimitDecision::Allow);
        }
    }

    #[tokio::test]
    async fn tokens_refill_over_time() {
        let limiter = RateLimiter::new(Some(50.0), 4);
        assert_eq!(limiter.check().await, RateLimitDecision::Allow);
        // Drain the burst allowance.
        while limiter.check().await == RateLimitDecision::Allow {}
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(limiter.check().await, RateLimitDecision::Allow);
    }

    #[tokio::test]
    async fn in_flight_guard_bounds_concurrency() {
        let limiter = Arc::new(RateLimiter::new(None, 2));
        let g1 = limiter.acquire().await;
        let _g2 = limiter.acquire().await;
        assert_eq!(limiter.available_slots(), 0);
        drop(g1);
        assert_eq!(limiter.available_slots(), 1);
    }
}
