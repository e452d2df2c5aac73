//! Accessor methods for `CloneConfig`

use std::path::Path;
use std::time::Duration;

use super::types::{BrowserOptions, CacheOptions, CloneConfig, RateOptions};
use crate::assets::AssetType;

impl CloneConfig {
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    #[must_use]
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[must_use]
    pub fn max_files(&self) -> Option<usize> {
        self.max_files
    }

    #[must_use]
    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    /// Per-page navigation timeout
    #[must_use]
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.page_secs)
    }

    /// Session-wide timeout
    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.total_secs)
    }

    #[must_use]
    pub fn follow_external_links(&self) -> bool {
        self.follow_external_links
    }

    #[must_use]
    pub fn include_types(&self) -> &[AssetType] {
        &self.include_types
    }

    #[must_use]
    pub fn exclude_types(&self) -> &[AssetType] {
        &self.exclude_types
    }

    #[must_use]
    pub fn rate(&self) -> &RateOptions {
        &self.rate
    }

    #[must_use]
    pub fn cache(&self) -> &CacheOptions {
        &self.cache
    }

    #[must_use]
    pub fn browser(&self) -> &BrowserOptions {
        &self.browser
    }

    #[must_use]
    pub fn analysis_depth(&self) -> u32 {
        self.analysis_depth
    }
}
