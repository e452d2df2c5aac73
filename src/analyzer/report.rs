//! Payload analysis report
//!
//! Aggregates the expected asset set into per-type totals, a
//! completeness-score rubric, a weighted complexity score and a download
//! ETA. The report is a best-effort enumeration: it is authoritative only
//! for what was actually observed in the rendered page.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::assets::AssetType;
use crate::utils::constants::ASSUMED_BANDWIDTH_BYTES_PER_SEC;

/// One asset the analyzer expects the crawl to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedAsset {
    pub url: String,
    pub asset_type: AssetType,
    pub critical: bool,
    /// HEAD-reported size, or a type heuristic when unavailable
    pub expected_size: u64,
    /// Whether the size came from a real content-length
    pub size_is_measured: bool,
}

/// Complete analyzer output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadReport {
    pub start_url: String,
    pub assets: Vec<ExpectedAsset>,
    /// Count per asset type
    pub counts_by_type: HashMap<String, usize>,
    /// Bytes per asset type
    pub bytes_by_type: HashMap<String, u64>,
    pub total_bytes: u64,
    pub critical_count: usize,
    /// Rubric score in [0,100]
    pub completeness_score: u32,
    /// Weighted complexity score
    pub complexity_score: f64,
    /// ETA at the assumed bandwidth
    pub estimated_seconds: u64,
    /// Stylesheet dereference depth actually reached
    pub analysis_depth_reached: u32,
}

impl PayloadReport {
    /// Build a report from the expected asset set.
    ///
    /// Rubric: 25 points for stylesheets present, 20 scripts, 20 images,
    /// 15 fonts, 20 for having completed the configured analysis depth.
    #[must_use]
    pub fn build(
        start_url: String,
        assets: Vec<ExpectedAsset>,
        analysis_depth_reached: u32,
        analysis_depth_configured: u32,
    ) -> Self {
        let mut counts_by_type: HashMap<String, usize> = HashMap::new();
        let mut bytes_by_type: HashMap<String, u64> = HashMap::new();
        let mut total_bytes = 0u64;
        let mut critical_count = 0usize;

        for asset in &assets {
            *counts_by_type.entry(asset.asset_type.to_string()).or_insert(0) += 1;
            *bytes_by_type.entry(asset.asset_type.to_string()).or_insert(0) +=
                asset.expected_size;
            total_bytes += asset.expected_size;
            if asset.critical {
                critical_count += 1;
            }
        }

        let has = |t: AssetType| assets.iter().any(|a| a.asset_type == t);
        let mut completeness_score = 0u32;
        if has(AssetType::Stylesheet) {
            completeness_score += 25;
        }
        if has(AssetType::Javascript) {
            completeness_score += 20;
        }
        if has(AssetType::Image) {
            completeness_score += 20;
        }
        if has(AssetType::Font) {
            completeness_score += 15;
        }
        if analysis_depth_reached >= analysis_depth_configured {
            completeness_score += 20;
        }

        let complexity_score = assets
            .iter()
            .map(|a| complexity_weight(a.asset_type))
            .sum::<f64>();

        let estimated_seconds =
            (total_bytes / ASSUMED_BANDWIDTH_BYTES_PER_SEC.max(1)).max(1);

        Self {
            start_url,
            assets,
            counts_by_type,
            bytes_by_type,
            total_bytes,
            critical_count,
            completeness_score,
            complexity_score,
            estimated_seconds,
            analysis_depth_reached,
        }
    }

    /// Canonical URLs of every expected asset
    #[must_use]
    pub fn expected_urls(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.url.clone()).collect()
    }

    /// The analyzer's estimated asset count
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }
}

/// Relative complexity contribution per asset type
fn complexity_weight(asset_type: AssetType) -> f64 {
    match asset_type {
        AssetType::Javascript => 3.0,
        AssetType::Stylesheet => 2.0,
        AssetType::ThreeDModel | AssetType::EnvironmentMap => 4.0,
        AssetType::Video => 2.5,
        AssetType::Font | AssetType::Texture => 1.5,
        AssetType::Image | AssetType::Audio => 1.0,
        AssetType::Html | AssetType::Manifest | AssetType::Other => 0.5,
    }
}
