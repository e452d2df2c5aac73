//! Completeness verification and recovery
//!
//! Cross-references the analyzer's expected asset set against what the
//! crawl actually downloaded, attempts direct recovery of critical misses,
//! audits on-disk sizes and scans saved content for URLs the crawl never
//! tracked. The final report carries a completeness percentage and a
//! type-weighted quality score.

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::assets::{classify, Asset, AssetTable, AssetType, DiscoveryMethod, DownloadStatus};
use crate::fetch::FetchPipeline;

/// Timeout for each recovery fetch
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(20);

/// Size divergence ratio beyond which a file is suspicious
const SUSPICIOUS_DIVERGENCE: f64 = 0.10;

/// Non-`other` files smaller than this are suspicious
const SUSPICIOUS_MIN_BYTES: u64 = 100;

lazy_static! {
    static ref ABSOLUTE_URL_RE: Regex = Regex::new(r#"https?://[^\s"'<>\\)]+"#)
        .expect("BUG: hardcoded absolute-url regex is invalid");
}

/// A file whose on-disk size disagrees with the record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousFile {
    pub url: String,
    pub local_path: String,
    pub recorded_size: u64,
    pub on_disk_size: u64,
    pub reason: String,
}

/// Verification outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub downloaded: Vec<String>,
    /// Expected but never discovered
    pub missing: Vec<String>,
    /// Discovered but failed to download
    pub failed: Vec<String>,
    /// Recorded as downloaded but absent on disk
    pub file_missing_on_disk: Vec<String>,
    /// Critical assets among missing + failed
    pub critical_misses: Vec<String>,
    /// Critical misses recovered by direct fetch
    pub recovered: Vec<String>,
    pub suspicious: Vec<SuspiciousFile>,
    /// URLs found in saved content but absent from the asset table
    pub missed_references: Vec<String>,
    /// Plain downloaded/expected percentage
    pub completeness_percent: f32,
    /// Type-weighted quality score in [0,100]
    pub quality_score: f32,
}

/// Completeness verifier over one session's output
pub struct Verifier {
    table: Arc<AssetTable>,
    output_root: std::path::PathBuf,
}

impl Verifier {
    #[must_use]
    pub fn new(table: Arc<AssetTable>, output_root: &Path) -> Self {
        Self {
            table,
            output_root: output_root.to_path_buf(),
        }
    }

    /// Run all verification phases.
    ///
    /// # Arguments
    /// * `expected` - Canonical URLs the analyzer promised
    /// * `pipeline` - Used for direct recovery fetches (cache bypassed)
    pub async fn verify(
        &self,
        expected: &[String],
        pipeline: &FetchPipeline,
    ) -> VerificationReport {
        let mut report = VerificationReport::default();

        // Phase 1: partition expected vs discovered/downloaded.
        for url in expected {
            match self.table.get(url) {
                None => report.missing.push(url.clone()),
                Some(asset) => match asset.status {
                    DownloadStatus::Downloaded => {
                        if self.on_disk(&asset).await {
                            report.downloaded.push(url.clone());
                        } else {
                            report.file_missing_on_disk.push(url.clone());
                        }
                    }
                    DownloadStatus::Failed => report.failed.push(url.clone()),
                    DownloadStatus::Pending | DownloadStatus::Downloading => {
                        report.failed.push(url.clone());
                    }
                },
            }
        }

        // Phase 2: flag critical misses.
        for url in report.missing.iter().chain(&report.failed) {
            let critical = self
                .table
                .get(url)
                .map_or_else(|| crate::assets::default_critical(classify(url, None)), |a| a.critical);
            if critical {
                report.critical_misses.push(url.clone());
            }
        }

        // Phase 3: direct recovery of critical misses.
        for url in report.critical_misses.clone() {
            if !self.table.contains(&url) {
                self.table.insert(Asset::new(
                    url.clone(),
                    url.clone(),
                    classify(&url, None),
                    DiscoveryMethod::DomScan,
                ));
            } else {
                self.table.reset_for_retry(&url);
            }

            match pipeline.fetch_direct(&url, RECOVERY_TIMEOUT).await {
                Ok(asset) if asset.status == DownloadStatus::Downloaded => {
                    info!("Recovered critical asset {url}");
                    report.recovered.push(url.clone());
                    report.downloaded.push(url.clone());
                    report.missing.retain(|u| u != &url);
                    report.failed.retain(|u| u != &url);
                }
                Ok(_) => debug!("Recovery fetch for {url} did not settle"),
                Err(e) => warn!("Recovery fetch failed for {url}: {e}"),
            }
        }

        // Phase 4: on-disk size audit.
        self.audit_sizes(&mut report).await;

        // Phase 5: scan saved text content for untracked URLs.
        report.missed_references = self.scan_for_missed().await;

        // Scores.
        let expected_total = expected.len().max(1);
        report.completeness_percent =
            (report.downloaded.len() as f32 / expected_total as f32) * 100.0;
        report.quality_score = self.quality_score(expected, &report);

        report
    }

    async fn on_disk(&self, asset: &Asset) -> bool {
        match &asset.local_path {
            Some(local) => tokio::fs::try_exists(self.output_root.join(local))
                .await
                .unwrap_or(false),
            None => false,
        }
    }

    /// Compare recorded sizes against the files actually on disk.
    async fn audit_sizes(&self, report: &mut VerificationReport) {
        for asset in self.table.snapshot() {
            if asset.status != DownloadStatus::Downloaded {
                continue;
            }
            let (Some(local), Some(recorded)) = (&asset.local_path, asset.actual_size) else {
                continue;
            };
            let Ok(metadata) = tokio::fs::metadata(self.output_root.join(local)).await else {
                continue;
            };
            let on_disk = metadata.len();

            let divergence = if recorded == 0 {
                if on_disk == 0 { 0.0 } else { 1.0 }
            } else {
                ((on_disk as f64) - (recorded as f64)).abs() / recorded as f64
            };

            if divergence > SUSPICIOUS_DIVERGENCE {
                report.suspicious.push(SuspiciousFile {
                    url: asset.url.clone(),
                    local_path: local.clone(),
                    recorded_size: recorded,
                    on_disk_size: on_disk,
                    reason: format!("size diverges {:.0}%", divergence * 100.0),
                });
            } else if on_disk < SUSPICIOUS_MIN_BYTES && asset.asset_type != AssetType::Other {
                report.suspicious.push(SuspiciousFile {
                    url: asset.url.clone(),
                    local_path: local.clone(),
                    recorded_size: recorded,
                    on_disk_size: on_disk,
                    reason: format!("{on_disk} bytes is implausibly small"),
                });
            }
        }
    }

    /// Scan downloaded HTML/CSS/JS for absolute URLs not in the table.
    async fn scan_for_missed(&self) -> Vec<String> {
        let tracked: HashSet<String> = self
            .table
            .snapshot()
            .into_iter()
            .map(|a| a.url)
            .collect();

        let mut missed = Vec::new();
        let mut seen = HashSet::new();

        for asset in self.table.snapshot() {
            if asset.status != DownloadStatus::Downloaded
                || !matches!(
                    asset.asset_type,
                    AssetType::Html | AssetType::Stylesheet | AssetType::Javascript
                )
            {
                continue;
            }
            let Some(local) = &asset.local_path else {
                continue;
            };
            let Ok(content) = tokio::fs::read_to_string(self.output_root.join(local)).await else {
                continue;
            };

            for m in ABSOLUTE_URL_RE.find_iter(&content) {
                let url = m.as_str().trim_end_matches(['.', ',', ';', ':']);
                // Only asset-shaped URLs are findings; page links are the
                // crawler's business.
                if classify(url, None) == AssetType::Other {
                    continue;
                }
                if !tracked.contains(url) && seen.insert(url.to_string()) {
                    missed.push(url.to_string());
                }
            }
        }

        missed
    }

    /// Weighted quality: downloaded weight over expected weight.
    fn quality_score(&self, expected: &[String], report: &VerificationReport) -> f32 {
        let weight_of = |url: &String| -> u32 {
            self.table
                .get(url)
                .map_or_else(|| classify(url, None).quality_weight(), |a| {
                    a.asset_type.quality_weight()
                })
        };

        let total: u32 = expected.iter().map(weight_of).sum();
        if total == 0 {
            return 100.0;
        }
        let downloaded_set: HashSet<&String> = report.downloaded.iter().collect();
        let achieved: u32 = expected
            .iter()
            .filter(|u| downloaded_set.contains(u))
            .map(weight_of)
            .sum();
        (achieved as f32 / total as f32) * 100.0
    }
}
