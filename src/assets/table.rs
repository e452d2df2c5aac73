//! Session-wide asset table
//!
//! Append-only map keyed by canonical URL. All discovery paths converge
//! here; the fetch pipeline, recursive discovery, rewriter and verifier all
//! read and update through this table.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{Asset, AssetType, DiscoveryMethod, DownloadStatus};

/// Thread-safe asset table keyed by canonical URL
#[derive(Default)]
pub struct AssetTable {
    assets: DashMap<String, Asset>,
}

/// Per-type totals for manifests and progress events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetCounts {
    pub total: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub pending: usize,
    pub by_type: HashMap<String, usize>,
}

impl AssetTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly discovered asset.
    ///
    /// Returns true when the asset was new. An existing entry is left
    /// untouched except that an asset observed by both processing paths is
    /// re-marked with `DiscoveryMethod::Both`.
    pub fn insert(&self, asset: Asset) -> bool {
        match self.assets.entry(asset.url.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                let current = existing.get_mut();
                if current.discovery_method != asset.discovery_method
                    && matches!(
                        (current.discovery_method, asset.discovery_method),
                        (DiscoveryMethod::DomScan, DiscoveryMethod::NetworkResponse)
                            | (DiscoveryMethod::NetworkResponse, DiscoveryMethod::DomScan)
                    )
                {
                    current.discovery_method = DiscoveryMethod::Both;
                }
                // Criticality only ever ratchets up.
                current.critical |= asset.critical;
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(asset);
                true
            }
        }
    }

    /// Look up an asset by canonical URL
    #[must_use]
    pub fn get(&self, url: &str) -> Option<Asset> {
        self.assets.get(url).map(|r| r.value().clone())
    }

    /// Whether the table already holds this URL
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.assets.contains_key(url)
    }

    /// Mark an asset as in flight.
    ///
    /// Returns false when the asset is unknown or already settled, enforcing
    /// at most one in-flight fetch per canonical URL.
    pub fn begin_download(&self, url: &str) -> bool {
        match self.assets.get_mut(url) {
            Some(mut asset) if asset.status == DownloadStatus::Pending => {
                asset.status = DownloadStatus::Downloading;
                true
            }
            _ => false,
        }
    }

    /// Commit a completed download.
    ///
    /// Size, checksum and local path become immutable after this call;
    /// a second commit for the same URL is rejected.
    pub fn commit_download(
        &self,
        url: &str,
        local_path: String,
        size: u64,
        checksum: String,
        content_type: Option<String>,
    ) -> bool {
        match self.assets.get_mut(url) {
            Some(mut asset) if asset.status != DownloadStatus::Downloaded => {
                asset.status = DownloadStatus::Downloaded;
                asset.local_path = Some(local_path);
                asset.actual_size = Some(size);
                asset.checksum = Some(checksum);
                if content_type.is_some() {
                    asset.content_type = content_type;
                }
                asset.downloaded_at = Some(chrono::Utc::now());
                asset.error_kind = None;
                asset.error_message = None;
                true
            }
            _ => false,
        }
    }

    /// Record a failed download.
    ///
    /// Downloaded assets are immutable and never regress to failed.
    pub fn record_failure(&self, url: &str, kind: &str, message: &str) {
        if let Some(mut asset) = self.assets.get_mut(url)
            && asset.status != DownloadStatus::Downloaded
        {
            asset.status = DownloadStatus::Failed;
            asset.error_kind = Some(kind.to_string());
            asset.error_message = Some(message.to_string());
        }
    }

    /// Reset a failed asset to pending so it can re-enter the pipeline
    pub fn reset_for_retry(&self, url: &str) -> bool {
        match self.assets.get_mut(url) {
            Some(mut asset) if asset.status == DownloadStatus::Failed => {
                asset.status = DownloadStatus::Pending;
                asset.error_kind = None;
                asset.error_message = None;
                true
            }
            _ => false,
        }
    }

    /// Record the expected size learned from a HEAD probe
    pub fn set_expected_size(&self, url: &str, size: u64) {
        if let Some(mut asset) = self.assets.get_mut(url) {
            asset.expected_size = Some(size);
        }
    }

    /// Promote an asset to critical
    pub fn mark_critical(&self, url: &str) {
        if let Some(mut asset) = self.assets.get_mut(url) {
            asset.critical = true;
        }
    }

    /// Snapshot every asset (cloned)
    #[must_use]
    pub fn snapshot(&self) -> Vec<Asset> {
        self.assets.iter().map(|r| r.value().clone()).collect()
    }

    /// URLs currently pending download
    #[must_use]
    pub fn pending_urls(&self) -> Vec<String> {
        self.assets
            .iter()
            .filter(|r| r.value().status == DownloadStatus::Pending)
            .map(|r| r.key().clone())
            .collect()
    }

    /// Assets of a given type (cloned)
    #[must_use]
    pub fn by_type(&self, asset_type: AssetType) -> Vec<Asset> {
        self.assets
            .iter()
            .filter(|r| r.value().asset_type == asset_type)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Number of assets in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Aggregate counts for progress reporting
    #[must_use]
    pub fn counts(&self) -> AssetCounts {
        let mut counts = AssetCounts::default();
        for entry in self.assets.iter() {
            let asset = entry.value();
            counts.total += 1;
            match asset.status {
                DownloadStatus::Downloaded => counts.downloaded += 1,
                DownloadStatus::Failed => counts.failed += 1,
                DownloadStatus::Pending | DownloadStatus::Downloading => counts.pending += 1,
            }
            *counts.by_type.entry(asset.asset_type.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Restore a table from persisted assets (session resume)
    #[must_use]
    pub fn from_assets(assets: Vec<Asset>) -> Self {
        let table = Self::new();
        for mut asset in assets {
            // Interrupted downloads restart from pending.
            if asset.status == DownloadStatus::Downloading {
                asset.status = DownloadStatus::Pending;
            }
            table.assets.insert(asset.url.clone(), asset);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::types::classify;

    fn sample(url: &str) -> Asset {
        Asset::new(
            url.to_string(),
            url.to_string(),
            classify(url, None),
            DiscoveryMethod::DomScan,
        )
    }

    #[test]
    fn insert_is_deduplicating() {
        let table = AssetTable::new();
        assert!(table.insert(sample("https://x/a.css")));
        assert!(!table.insert(sample("https://x/a.css")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn both_paths_mark_discovery_both() {
        let table = AssetTable::new();
        table.insert(sample("https://x/a.js"));
        let mut network = sample("https://x/a.js");
        network.discovery_method = DiscoveryMethod::NetworkResponse;
        table.insert(network);
        assert_eq!(
            table.get("https://x/a.js").expect("asset").discovery_method,
            DiscoveryMethod::Both
        );
    }

    #[test]
    fn downloaded_fields_are_immutable() {
        let table = AssetTable::new();
        table.insert(sample("https://x/a.css"));
        assert!(table.begin_download("https://x/a.css"));
        assert!(table.commit_download(
            "https://x/a.css",
            "css/a.css".to_string(),
            10,
            "abc".to_string(),
            None
        ));

        // Second commit and late failure are both rejected.
        assert!(!table.commit_download(
            "https://x/a.css",
            "elsewhere".to_string(),
            99,
            "zzz".to_string(),
            None
        ));
        table.record_failure("https://x/a.css", "network", "late failure");

        let asset = table.get("https://x/a.css").expect("asset");
        assert_eq!(asset.status, DownloadStatus::Downloaded);
        assert_eq!(asset.local_path.as_deref(), Some("css/a.css"));
        assert_eq!(asset.actual_size, Some(10));
        assert_eq!(asset.checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn begin_download_serializes_per_url() {
        let table = AssetTable::new();
        table.insert(sample("https://x/a.png"));
        assert!(table.begin_download("https://x/a.png"));
        assert!(!table.begin_download("https://x/a.png"));
    }

    #[test]
    fn resume_restores_downloading_as_pending() {
        let table = AssetTable::new();
        table.insert(sample("https://x/a.png"));
        table.begin_download("https://x/a.png");

        let restored = AssetTable::from_assets(table.snapshot());
        assert_eq!(
            restored.get("https://x/a.png").expect("asset").status,
            DownloadStatus::Pending
        );
    }
}
