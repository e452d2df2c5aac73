//! Type-safe builder for `CloneConfig` using the typestate pattern
//!
//! Required fields (output root, start URL) are enforced at compile time:
//! `build()` only exists once both have been provided.

use anyhow::{anyhow, Result};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::{BrowserOptions, CacheOptions, CloneConfig, RateOptions, TimeoutOptions};
use crate::assets::AssetType;
use crate::utils::constants::MAX_DEPTH_CEILING;

// Type states
pub struct WithOutputRoot;
pub struct Complete;

pub struct CloneConfigBuilder<State = ()> {
    output_root: Option<PathBuf>,
    start_url: Option<String>,
    max_depth: u32,
    max_files: Option<usize>,
    max_file_size: Option<u64>,
    timeouts: TimeoutOptions,
    follow_external_links: bool,
    include_types: Vec<AssetType>,
    exclude_types: Vec<AssetType>,
    rate: RateOptions,
    cache: CacheOptions,
    browser: BrowserOptions,
    analysis_depth: u32,
    _phantom: PhantomData<State>,
}

impl Default for CloneConfigBuilder<()> {
    fn default() -> Self {
        let defaults = CloneConfig::default();
        Self {
            output_root: None,
            start_url: None,
            max_depth: defaults.max_depth,
            max_files: defaults.max_files,
            max_file_size: defaults.max_file_size,
            timeouts: defaults.timeouts,
            follow_external_links: defaults.follow_external_links,
            include_types: defaults.include_types,
            exclude_types: defaults.exclude_types,
            rate: defaults.rate,
            cache: defaults.cache,
            browser: defaults.browser,
            analysis_depth: defaults.analysis_depth,
            _phantom: PhantomData,
        }
    }
}

impl CloneConfigBuilder<()> {
    /// Set the output root (required first step)
    #[must_use]
    pub fn output_root(self, root: impl Into<PathBuf>) -> CloneConfigBuilder<WithOutputRoot> {
        CloneConfigBuilder {
            output_root: Some(root.into()),
            start_url: self.start_url,
            max_depth: self.max_depth,
            max_files: self.max_files,
            max_file_size: self.max_file_size,
            timeouts: self.timeouts,
            follow_external_links: self.follow_external_links,
            include_types: self.include_types,
            exclude_types: self.exclude_types,
            rate: self.rate,
            cache: self.cache,
            browser: self.browser,
            analysis_depth: self.analysis_depth,
            _phantom: PhantomData,
        }
    }
}

impl CloneConfigBuilder<WithOutputRoot> {
    /// Set the start URL (required second step)
    #[must_use]
    pub fn start_url(self, url: impl Into<String>) -> CloneConfigBuilder<Complete> {
        CloneConfigBuilder {
            output_root: self.output_root,
            start_url: Some(url.into()),
            max_depth: self.max_depth,
            max_files: self.max_files,
            max_file_size: self.max_file_size,
            timeouts: self.timeouts,
            follow_external_links: self.follow_external_links,
            include_types: self.include_types,
            exclude_types: self.exclude_types,
            rate: self.rate,
            cache: self.cache,
            browser: self.browser,
            analysis_depth: self.analysis_depth,
            _phantom: PhantomData,
        }
    }
}

impl<State> CloneConfigBuilder<State> {
    /// Crawl depth (clamped to the hard ceiling at build time)
    #[must_use]
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Maximum downloaded files per session
    #[must_use]
    pub fn max_files(mut self, limit: usize) -> Self {
        self.max_files = Some(limit);
        self
    }

    /// Per-file size ceiling in bytes
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Per-page and session-wide timeouts in seconds
    #[must_use]
    pub fn timeouts(mut self, page_secs: u64, total_secs: u64) -> Self {
        self.timeouts = TimeoutOptions {
            page_secs,
            total_secs,
        };
        self
    }

    /// Follow links to other origins
    #[must_use]
    pub fn follow_external_links(mut self, follow: bool) -> Self {
        self.follow_external_links = follow;
        self
    }

    /// Restrict fetching to these types
    #[must_use]
    pub fn include_types(mut self, types: Vec<AssetType>) -> Self {
        self.include_types = types;
        self
    }

    /// Never fetch these types
    #[must_use]
    pub fn exclude_types(mut self, types: Vec<AssetType>) -> Self {
        self.exclude_types = types;
        self
    }

    /// Requests-per-second bound and in-flight concurrency
    #[must_use]
    pub fn rate(mut self, rps: Option<f64>, max_concurrent: usize) -> Self {
        self.rate = RateOptions {
            rps,
            max_concurrent,
        };
        self
    }

    /// Cache toggle and size budget
    #[must_use]
    pub fn cache(mut self, enabled: bool, max_size: u64) -> Self {
        self.cache = CacheOptions { enabled, max_size };
        self
    }

    /// Browser headless mode and viewport
    #[must_use]
    pub fn browser(mut self, headless: bool, viewport_width: u32, viewport_height: u32) -> Self {
        self.browser = BrowserOptions {
            headless,
            viewport_width,
            viewport_height,
        };
        self
    }

    /// Stylesheet dereference depth during payload analysis
    #[must_use]
    pub fn analysis_depth(mut self, depth: u32) -> Self {
        self.analysis_depth = depth;
        self
    }
}

impl CloneConfigBuilder<Complete> {
    /// Validate and produce the config.
    ///
    /// The output root is made absolute and the depth clamped to the
    /// ceiling here, so the rest of the system never revalidates.
    pub fn build(self) -> Result<CloneConfig> {
        let output_root = self
            .output_root
            .ok_or_else(|| anyhow!("output root missing despite typestate"))?;
        let start_url = self
            .start_url
            .ok_or_else(|| anyhow!("start url missing despite typestate"))?;

        url::Url::parse(&start_url)
            .map_err(|e| anyhow!("Invalid start URL '{start_url}': {e}"))?;

        let output_root = if output_root.is_absolute() {
            output_root
        } else {
            std::env::current_dir()
                .map_err(|e| anyhow!("Cannot resolve current directory: {e}"))?
                .join(output_root)
        };

        Ok(CloneConfig {
            output_root,
            start_url,
            max_depth: self.max_depth.min(MAX_DEPTH_CEILING),
            max_files: self.max_files,
            max_file_size: self.max_file_size,
            timeouts: self.timeouts,
            follow_external_links: self.follow_external_links,
            include_types: self.include_types,
            exclude_types: self.exclude_types,
            rate: self.rate,
            cache: self.cache,
            browser: self.browser,
            analysis_depth: self.analysis_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_required_fields() {
        let config = CloneConfig::builder()
            .output_root("/tmp/mirror")
            .start_url("https://example.com")
            .build()
            .expect("valid config");
        assert_eq!(config.start_url(), "https://example.com");
        assert!(config.output_root().is_absolute());
    }

    #[test]
    fn depth_is_clamped_to_ceiling() {
        let config = CloneConfig::builder()
            .output_root("/tmp/mirror")
            .start_url("https://example.com")
            .max_depth(99)
            .build()
            .expect("valid config");
        assert_eq!(config.max_depth(), MAX_DEPTH_CEILING);
    }

    #[test]
    fn invalid_start_url_is_rejected() {
        let result = CloneConfig::builder()
            .output_root("/tmp/mirror")
            .start_url("not a url")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn relative_output_root_becomes_absolute() {
        let config = CloneConfig::builder()
            .output_root("relative/mirror")
            .start_url("https://example.com")
            .build()
            .expect("valid config");
        assert!(config.output_root().is_absolute());
    }
}
