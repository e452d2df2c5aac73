//! Hybrid processing engine
//!
//! Decides per page whether static parsing, dynamic (in-browser)
//! discovery, or both are warranted, runs the chosen paths and merges
//! their findings by canonical URL. Static-discovered assets win on
//! metadata; dynamic-only additions are appended; assets seen by both
//! paths are marked accordingly.

pub mod content_analyzer;
pub mod dynamic;
pub mod static_parser;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;

use crate::assets::{classify, Asset, AssetType, DiscoveryMethod};
use crate::url_resolver::{is_fetchable_url, UrlResolver};

pub use content_analyzer::{analyze_content, ContentAnalysis, Framework, FrameworkDetection};
pub use dynamic::{extract_dynamic, DynamicExtraction};
pub use static_parser::{extract_static, extract_sync, StaticExtraction};

/// Settle window for dynamic network observation
const DYNAMIC_SETTLE: Duration = Duration::from_millis(800);

/// Selected processing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStrategy {
    Static,
    Dynamic,
    Hybrid,
}

/// Per-page processing context
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// Force a strategy regardless of the score
    pub force_strategy: Option<ProcessingStrategy>,
    /// Analyzer's asset estimate, for the completeness denominator
    pub estimated_assets: Option<usize>,
    /// Static parse timeout
    pub parse_timeout: Duration,
    /// Fall back to dynamic when static parsing times out
    pub allow_dynamic_fallback: bool,
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self {
            force_strategy: None,
            estimated_assets: None,
            parse_timeout: Duration::from_secs(10),
            allow_dynamic_fallback: true,
        }
    }
}

/// Result of processing one page
#[derive(Debug)]
pub struct PageResult {
    pub url: String,
    pub assets: Vec<Asset>,
    /// Absolute link targets for crawl expansion
    pub links: Vec<String>,
    /// Strategy-specific completeness in [0,1]
    pub completeness: f64,
    pub strategy: ProcessingStrategy,
    pub analysis: ContentAnalysis,
    /// Non-fatal failures encountered along the way
    pub errors: Vec<String>,
}

/// Hybrid processor shared by the orchestrator
pub struct HybridProcessor {
    resolver: Arc<UrlResolver>,
}

impl HybridProcessor {
    #[must_use]
    pub fn new(resolver: Arc<UrlResolver>) -> Self {
        Self { resolver }
    }

    /// Process one page.
    ///
    /// The page handle is optional: without one, dynamic and hybrid
    /// degrade to static with a recorded error.
    pub async fn process(
        &self,
        url: &str,
        html: &str,
        page: Option<&Page>,
        ctx: &ProcessContext,
    ) -> PageResult {
        let analysis = analyze_content(html);
        let strategy = ctx
            .force_strategy
            .unwrap_or_else(|| select_strategy(&analysis));
        debug!(
            "Processing {url} with {strategy:?} strategy (score signals: js={:.2} dyn={:.2} fw={:.2})",
            analysis.js_complexity,
            analysis.dynamic_signals,
            analysis.max_framework_confidence()
        );

        let mut errors = Vec::new();
        let mut static_assets: Vec<Asset> = Vec::new();
        let mut dynamic_assets: Vec<Asset> = Vec::new();
        let mut links = Vec::new();
        let mut both_count = 0usize;
        let mut effective = strategy;

        match strategy {
            ProcessingStrategy::Static => {
                match self.run_static(url, html, ctx).await {
                    Ok((assets, found_links)) => {
                        static_assets = assets;
                        links = found_links;
                    }
                    Err(e) => {
                        errors.push(e.clone());
                        if ctx.allow_dynamic_fallback && page.is_some() {
                            warn!("Static parse failed for {url}, falling back to dynamic: {e}");
                            effective = ProcessingStrategy::Dynamic;
                            match self.run_dynamic(url, page).await {
                                Ok(assets) => dynamic_assets = assets,
                                Err(e) => errors.push(e),
                            }
                        }
                    }
                }
            }
            ProcessingStrategy::Dynamic => match self.run_dynamic(url, page).await {
                Ok(assets) => dynamic_assets = assets,
                Err(e) => {
                    errors.push(e);
                    // Keep something rather than nothing.
                    if let Ok((assets, found_links)) = self.run_static(url, html, ctx).await {
                        static_assets = assets;
                        links = found_links;
                        effective = ProcessingStrategy::Static;
                    }
                }
            },
            ProcessingStrategy::Hybrid => {
                // Both paths run concurrently; a dynamic failure is
                // isolated to its own path.
                let (static_result, dynamic_result) = tokio::join!(
                    self.run_static(url, html, ctx),
                    self.run_dynamic(url, page)
                );
                match static_result {
                    Ok((assets, found_links)) => {
                        static_assets = assets;
                        links = found_links;
                    }
                    Err(e) => errors.push(e),
                }
                match dynamic_result {
                    Ok(assets) => dynamic_assets = assets,
                    Err(e) => errors.push(e),
                }
            }
        }

        let assets = merge_assets(static_assets, dynamic_assets, &mut both_count);
        let completeness = completeness_score(
            &assets,
            ctx.estimated_assets,
            effective,
            both_count,
        );

        PageResult {
            url: url.to_string(),
            assets,
            links,
            completeness,
            strategy: effective,
            analysis,
            errors,
        }
    }

    async fn run_static(
        &self,
        url: &str,
        html: &str,
        ctx: &ProcessContext,
    ) -> Result<(Vec<Asset>, Vec<String>), String> {
        let extraction = extract_static(html.to_string(), ctx.parse_timeout)
            .await
            .map_err(|e| e.to_string())?;

        self.resolver.push_base(extraction.base_href.clone());
        let mut assets = Vec::new();
        for href in &extraction.stylesheets {
            self.push_asset(&mut assets, url, href, Some(AssetType::Stylesheet), DiscoveryMethod::DomScan);
        }
        for src in &extraction.scripts {
            self.push_asset(&mut assets, url, src, Some(AssetType::Javascript), DiscoveryMethod::DomScan);
        }
        for src in &extraction.images {
            self.push_asset(&mut assets, url, src, Some(AssetType::Image), DiscoveryMethod::DomScan);
        }
        for style in &extraction.inline_styles {
            for reference in crate::rewriter::extract_css_refs(style) {
                self.push_asset(&mut assets, url, &reference, None, DiscoveryMethod::CssUrl);
            }
        }
        let links = extraction
            .links
            .iter()
            .filter(|href| is_fetchable_url(href))
            .map(|href| self.resolver.resolve(url, None, href))
            .filter(|resolved| resolved.starts_with("http"))
            .collect();
        self.resolver.pop_base();

        Ok((assets, links))
    }

    async fn run_dynamic(&self, url: &str, page: Option<&Page>) -> Result<Vec<Asset>, String> {
        let Some(page) = page else {
            return Err("dynamic path unavailable without a page handle".to_string());
        };

        let extraction = extract_dynamic(page, DYNAMIC_SETTLE)
            .await
            .map_err(|e| e.to_string())?;

        let mut assets = Vec::new();
        for network_url in &extraction.network_urls {
            self.push_asset(&mut assets, url, network_url, None, DiscoveryMethod::NetworkResponse);
        }
        let harvest = &extraction.harvest;
        for href in &harvest.stylesheets {
            self.push_asset(&mut assets, url, href, Some(AssetType::Stylesheet), DiscoveryMethod::DomScan);
        }
        for script in &harvest.scripts {
            self.push_asset(&mut assets, url, &script.url, Some(AssetType::Javascript), DiscoveryMethod::DomScan);
        }
        for src in &harvest.images {
            self.push_asset(&mut assets, url, src, Some(AssetType::Image), DiscoveryMethod::DataAttr);
        }
        for srcset in &harvest.srcsets {
            for candidate in crate::rewriter::parse_srcset(srcset) {
                self.push_asset(&mut assets, url, &candidate.url, Some(AssetType::Image), DiscoveryMethod::Srcset);
            }
        }
        for src in &harvest.media {
            self.push_asset(&mut assets, url, src, None, DiscoveryMethod::DomScan);
        }
        for css in harvest.inline_css.iter().chain(&harvest.bg_images) {
            for reference in crate::rewriter::extract_css_refs(css) {
                self.push_asset(&mut assets, url, &reference, None, DiscoveryMethod::CssUrl);
            }
        }

        Ok(assets)
    }

    fn push_asset(
        &self,
        assets: &mut Vec<Asset>,
        page_url: &str,
        raw: &str,
        forced_type: Option<AssetType>,
        method: DiscoveryMethod,
    ) {
        let raw = raw.trim();
        if !is_fetchable_url(raw) {
            return;
        }
        let canonical = self.resolver.resolve(page_url, None, raw);
        if !canonical.starts_with("http") || assets.iter().any(|a| a.url == canonical) {
            return;
        }
        let asset_type = forced_type.unwrap_or_else(|| classify(&canonical, None));
        assets.push(Asset::new(canonical, raw.to_string(), asset_type, method));
    }
}

/// Score the strategy for a page.
///
/// Positive signals favor static parsing, negative favor dynamic
/// discovery. Score >= 4 selects static, <= -3 dynamic, otherwise hybrid.
#[must_use]
pub fn select_strategy(analysis: &ContentAnalysis) -> ProcessingStrategy {
    let mut score = 0i32;

    if analysis.js_complexity < 0.3 {
        score += 2;
    } else if analysis.js_complexity > 0.7 {
        score -= 2;
    }

    if analysis.frameworks.is_empty() {
        score += 2;
    } else if analysis.max_framework_confidence() >= 0.8 {
        score -= 2;
    }

    if analysis.dynamic_signals < 0.3 {
        score += 1;
    } else if analysis.dynamic_signals > 0.6 {
        score -= 2;
    }

    if analysis.html_size < 100 * 1024 {
        score += 1;
    } else if analysis.html_size > 1024 * 1024 {
        score -= 1;
    }

    if analysis.has_spa_indicators {
        score -= 2;
    }

    if score >= 4 {
        ProcessingStrategy::Static
    } else if score <= -3 {
        ProcessingStrategy::Dynamic
    } else {
        ProcessingStrategy::Hybrid
    }
}

/// Merge static and dynamic findings by canonical URL.
///
/// Static entries keep their metadata; dynamic-only entries are appended;
/// URLs seen by both are marked `DiscoveryMethod::Both`.
fn merge_assets(
    static_assets: Vec<Asset>,
    dynamic_assets: Vec<Asset>,
    both_count: &mut usize,
) -> Vec<Asset> {
    let mut merged = static_assets;

    for dynamic in dynamic_assets {
        if let Some(existing) = merged.iter_mut().find(|a| a.url == dynamic.url) {
            existing.discovery_method = DiscoveryMethod::Both;
            existing.critical |= dynamic.critical;
            *both_count += 1;
        } else {
            merged.push(dynamic);
        }
    }

    merged
}

/// Per-strategy completeness in [0,1]: coverage against the analyzer's
/// estimate plus bonuses for each major type found; hybrid earns a small
/// bonus per both-discovered asset.
fn completeness_score(
    assets: &[Asset],
    estimated: Option<usize>,
    strategy: ProcessingStrategy,
    both_count: usize,
) -> f64 {
    let coverage = match estimated {
        Some(estimate) if estimate > 0 => (assets.len() as f64 / estimate as f64).min(1.0),
        _ => {
            if assets.is_empty() {
                0.0
            } else {
                0.5
            }
        }
    };

    let has = |t: AssetType| assets.iter().any(|a| a.asset_type == t);
    let mut bonus = 0.0;
    for t in [
        AssetType::Stylesheet,
        AssetType::Javascript,
        AssetType::Image,
        AssetType::Font,
    ] {
        if has(t) {
            bonus += 0.075;
        }
    }

    let hybrid_bonus = if strategy == ProcessingStrategy::Hybrid {
        (both_count as f64 * 0.01).min(0.1)
    } else {
        0.0
    };

    (coverage * 0.7 + bonus + hybrid_bonus).min(1.0)
}
