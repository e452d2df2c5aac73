//! Core configuration types for mirroring sessions
//!
//! `CloneConfig` is the options snapshot a session runs with; it is
//! serialized into the session state so a resumed session continues under
//! the options it started with.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::assets::AssetType;
use crate::utils::constants::{
    DEFAULT_MAX_CACHE_SIZE, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_DEPTH, DEFAULT_PAGE_TIMEOUT_SECS,
    DEFAULT_RATE_RPS, DEFAULT_TOTAL_TIMEOUT_SECS, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
};

/// Timeout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutOptions {
    /// Per-page navigation timeout in seconds
    pub page_secs: u64,
    /// Session-wide timeout in seconds
    pub total_secs: u64,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            page_secs: DEFAULT_PAGE_TIMEOUT_SECS,
            total_secs: DEFAULT_TOTAL_TIMEOUT_SECS,
        }
    }
}

/// Request rate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateOptions {
    /// Global requests per second; None disables the bound
    pub rps: Option<f64>,
    /// Maximum concurrent in-flight requests
    pub max_concurrent: usize,
}

impl Default for RateOptions {
    fn default() -> Self {
        Self {
            rps: Some(DEFAULT_RATE_RPS),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheOptions {
    pub enabled: bool,
    pub max_size: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

/// Headless browser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// Full options snapshot for a mirroring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Root directory sessions are written under.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in the builder),
    /// so path arithmetic agrees across the pipeline, rewriter and
    /// verifier.
    pub(crate) output_root: PathBuf,
    pub(crate) start_url: String,
    /// Crawl depth; clamped to the hard ceiling in the builder
    pub(crate) max_depth: u32,
    /// Maximum files downloaded per session
    pub(crate) max_files: Option<usize>,
    /// Per-file size ceiling in bytes
    pub(crate) max_file_size: Option<u64>,
    pub(crate) timeouts: TimeoutOptions,
    pub(crate) follow_external_links: bool,
    /// When non-empty, only these types are fetched
    pub(crate) include_types: Vec<AssetType>,
    /// Types never fetched
    pub(crate) exclude_types: Vec<AssetType>,
    pub(crate) rate: RateOptions,
    pub(crate) cache: CacheOptions,
    pub(crate) browser: BrowserOptions,
    /// Stylesheet dereference depth during payload analysis
    pub(crate) analysis_depth: u32,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./mirror"),
            start_url: String::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_files: None,
            max_file_size: None,
            timeouts: TimeoutOptions::default(),
            follow_external_links: false,
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            rate: RateOptions::default(),
            cache: CacheOptions::default(),
            browser: BrowserOptions::default(),
            analysis_depth: 2,
        }
    }
}

impl CloneConfig {
    /// Start building a config; output root and start URL are required.
    #[must_use]
    pub fn builder() -> super::builder::CloneConfigBuilder<()> {
        super::builder::CloneConfigBuilder::default()
    }

    /// Whether an asset type passes the include/exclude filters
    #[must_use]
    pub fn type_allowed(&self, asset_type: AssetType) -> bool {
        if self.exclude_types.contains(&asset_type) {
            return false;
        }
        self.include_types.is_empty() || self.include_types.contains(&asset_type)
    }
}
