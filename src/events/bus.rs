//! Broadcast event bus
//!
//! Best-effort delivery over a `tokio::sync::broadcast` channel: publishing
//! never blocks the crawl, slow subscribers observe lag rather than
//! applying backpressure, and publishing without subscribers is counted but
//! harmless.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use super::types::CloneEvent;

/// Buffered events per subscriber before lag kicks in
const DEFAULT_BUS_CAPACITY: usize = 256;

/// Delivery counters
#[derive(Debug, Default)]
struct BusMetrics {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of bus counters
#[derive(Debug, Clone, Copy, Default)]
pub struct BusMetricsSnapshot {
    pub published: u64,
    pub dropped: u64,
}

/// Event bus shared by the orchestrator and its subsystems
pub struct EventBus {
    sender: broadcast::Sender<CloneEvent>,
    metrics: BusMetrics,
}

impl EventBus {
    /// Create a bus with the default buffer
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus with an explicit per-subscriber buffer
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            metrics: BusMetrics::default(),
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped and counted; this is not an
    /// error, headless embedders simply don't listen.
    pub fn publish(&self, event: CloneEvent) {
        match self.sender.send(event) {
            Ok(receivers) => {
                self.metrics.published.fetch_add(1, Ordering::Relaxed);
                log::trace!("Published event to {receivers} subscribers");
            }
            Err(_) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Subscribe to the stream from this point on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CloneEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Counter snapshot
    #[must_use]
    pub fn metrics(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            published: self.metrics.published.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
