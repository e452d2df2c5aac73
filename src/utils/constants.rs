//! Shared configuration constants
//!
//! Default values used throughout the codebase to ensure consistency and
//! avoid magic numbers.

/// Default crawl depth: 3 levels from the start page
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// Hard ceiling on crawl depth regardless of configuration
pub const MAX_DEPTH_CEILING: u32 = 5;

/// Default concurrent asset fetches
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default global request rate in requests per second
///
/// Conservative enough that most origins tolerate it without throttling,
/// while keeping a typical mirror under a minute for small sites.
pub const DEFAULT_RATE_RPS: f64 = 8.0;

/// Default session-wide timeout in seconds
pub const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 300;

/// Default per-page navigation timeout in seconds
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 30;

/// Default maximum cache size in bytes (500 MB)
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 500 * 1024 * 1024;

/// Default cache entry time-to-live in seconds (24 hours)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Global cache retention window in seconds (7 days)
///
/// Entries older than this are removed during initialization maintenance
/// even if their own TTL has not elapsed.
pub const CACHE_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

/// How many recursive discovery passes to run before giving up on fixpoint
pub const MAX_DISCOVERY_PASSES: usize = 3;

/// Resume points retained per session (ring buffer)
pub const MAX_RESUME_POINTS: usize = 20;

/// Checkpoint interval in seconds
pub const CHECKPOINT_INTERVAL_SECS: u64 = 5 * 60;

/// Checkpoint after this many processed URLs
pub const CHECKPOINT_URL_INTERVAL: usize = 100;

/// Sessions older than this are not recoverable at startup (1 hour)
pub const RECOVERY_HORIZON_SECS: i64 = 60 * 60;

/// Assumed download bandwidth for ETA estimates (bytes/sec, ~4 MB/s)
pub const ASSUMED_BANDWIDTH_BYTES_PER_SEC: u64 = 4 * 1024 * 1024;

/// Chrome user agent presented on plain HTTP requests
///
/// Keeps transport requests indistinguishable from the headless browser so
/// origins that gate on user-agent serve the same bytes to both paths.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Default viewport width for headless pages
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1366;

/// Default viewport height for headless pages
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 900;
