//! Concurrency-bounded, cache-backed asset downloading

pub mod filename;
pub mod pipeline;
pub mod transport;

pub use filename::{derive_filename, with_collision_suffix};
pub use pipeline::{FetchPipeline, FetchPipelineConfig};
pub use transport::{HttpTransport, TransportResponse};
