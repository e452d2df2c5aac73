//! sitemirror: self-contained local mirrors of modern web applications
//!
//! Given a start URL, produces an offline-working copy of the site:
//! a headless payload analysis enumerates the expected asset set, a hybrid
//! static/dynamic processor discovers assets per page, a cache- and
//! retry-backed pipeline downloads them, and a build-tool-aware rewriter
//! points every reference at its local copy.

pub mod analyzer;
pub mod assets;
pub mod browser;
pub mod build_tool;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod fetch;
pub mod hybrid;
pub mod orchestrator;
pub mod retry;
pub mod rewriter;
pub mod session;
pub mod url_resolver;
pub mod utils;
pub mod verifier;

pub use assets::{Asset, AssetTable, AssetType, DiscoveryMethod, DownloadStatus};
pub use build_tool::{BuildTool, BuildToolFingerprint, PathStrategy};
pub use cache::{CacheConfig, CacheStore};
pub use config::{CloneConfig, CloneConfigBuilder};
pub use error::{CloneError, CloneResult, NetworkKind};
pub use events::{CloneEvent, EventBus};
pub use fetch::{FetchPipeline, HttpTransport};
pub use hybrid::{HybridProcessor, ProcessingStrategy};
pub use orchestrator::{CloneOutcome, Orchestrator};
pub use retry::{CircuitBreaker, RateLimiter, RetryManager, RetryPolicy};
pub use session::{SessionManager, SessionStatus};
pub use url_resolver::UrlResolver;
pub use verifier::{VerificationReport, Verifier};

/// Mirror a site with the given configuration.
///
/// Convenience wrapper constructing an orchestrator and running one
/// session to completion.
pub async fn mirror(config: CloneConfig) -> CloneResult<CloneOutcome> {
    let orchestrator = Orchestrator::new(config).await?;
    orchestrator.run().await
}
