//! Per-domain concurrency limiter
//!
//! Each domain gets its own semaphore so one slow origin cannot absorb the
//! whole fetch pool, and no origin sees more simultaneous connections than
//! a browser would open.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-domain concurrency limiter using a lock-free map of semaphores
pub struct DomainLimiter {
    domain_semaphores: DashMap<String, Arc<Semaphore>>,
    max_per_domain: usize,
}

impl DomainLimiter {
    /// Create a limiter with the given per-domain bound
    #[must_use]
    pub fn new(max_per_domain: usize) -> Self {
        Self {
            domain_semaphores: DashMap::new(),
            max_per_domain: max_per_domain.max(1),
        }
    }

    /// Acquire a permit for a domain, creating its semaphore on first use.
    ///
    /// The permit releases on drop. Semaphores are never closed, so
    /// acquisition cannot fail.
    pub async fn acquire(&self, domain: &str) -> OwnedSemaphorePermit {
        let semaphore = self
            .domain_semaphores
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_domain)))
            .clone();

        semaphore
            .acquire_owned()
            .await
            .expect("BUG: domain semaphore is never closed")
    }

    /// Available permits for a domain (the full bound if unseen)
    #[must_use]
    pub fn available(&self, domain: &str) -> usize {
        self.domain_semaphores
            .get(domain)
            .map_or(self.max_per_domain, |s| s.available_permits())
    }
}
