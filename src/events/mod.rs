//! Session event stream: tagged message types and the broadcast bus

pub mod bus;
pub mod types;

pub use bus::{BusMetricsSnapshot, EventBus};
pub use types::{AssetSummary, CloneEvent};
