//! Payload analyzer: pre-crawl reconnaissance
//!
//! Renders the start page headlessly, fires lazy-loading triggers,
//! harvests every referenceable URL from the live DOM, dereferences
//! discovered stylesheets to a bounded depth, and sizes the expected set
//! with HEAD probes. The resulting report drives progress estimation and
//! the completeness verifier.

pub mod js_scripts;
pub mod report;

use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::assets::{classify, AssetType};
use crate::error::{CloneError, CloneResult};
use crate::fetch::HttpTransport;
use crate::rewriter::{extract_css_refs, parse_srcset};
use crate::url_resolver::{is_fetchable_url, UrlResolver};

pub use report::{ExpectedAsset, PayloadReport};

/// Concurrent HEAD probes while sizing
const HEAD_CONCURRENCY: usize = 8;

/// Timeout per HEAD probe
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout per stylesheet dereference
const CSS_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Raw DOM harvest as returned by the in-page script
#[derive(Debug, Default, Deserialize)]
pub struct HarvestedRefs {
    #[serde(default)]
    pub stylesheets: Vec<String>,
    #[serde(default)]
    pub scripts: Vec<ScriptRef>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub srcsets: Vec<String>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub icons: Vec<String>,
    #[serde(default)]
    pub manifests: Vec<String>,
    #[serde(default)]
    pub inline_css: Vec<String>,
    #[serde(default)]
    pub bg_images: Vec<String>,
}

/// Script reference with load-mode flags
#[derive(Debug, Deserialize)]
pub struct ScriptRef {
    pub url: String,
    #[serde(default)]
    pub defer: bool,
    #[serde(default)]
    pub async_load: bool,
}

/// An expected asset before sizing
#[derive(Debug, Clone)]
struct ExpectedSeed {
    url: String,
    asset_type: AssetType,
    critical: bool,
}

/// Pre-crawl analyzer
pub struct PayloadAnalyzer {
    transport: HttpTransport,
    resolver: Arc<UrlResolver>,
    analysis_depth: u32,
}

impl PayloadAnalyzer {
    #[must_use]
    pub fn new(transport: HttpTransport, resolver: Arc<UrlResolver>, analysis_depth: u32) -> Self {
        Self {
            transport,
            resolver,
            analysis_depth,
        }
    }

    /// Analyze an already-created page.
    ///
    /// The caller owns navigation lifecycle; this navigates, triggers lazy
    /// mechanisms, harvests, dereferences stylesheets and sizes the set.
    pub async fn analyze(
        &self,
        page: &Page,
        start_url: &str,
        page_timeout: Duration,
    ) -> CloneResult<PayloadReport> {
        crate::browser::navigate_idle(page, start_url, page_timeout)
            .await
            .map_err(|e| {
                warn!("Analyzer navigation failure for {start_url}: {e:#}");
                CloneError::Timeout(page_timeout)
            })?;

        if let Err(e) = page.evaluate(js_scripts::LAZY_TRIGGER_SCRIPT).await {
            // Lazy triggers are best-effort; a hostile page must not sink
            // the analysis.
            warn!("Lazy triggers failed on {start_url}: {e}");
        }

        let harvest: HarvestedRefs = page
            .evaluate(js_scripts::HARVEST_SCRIPT)
            .await
            .map_err(|e| CloneError::HtmlParse(format!("harvest script: {e}")))?
            .into_value()
            .map_err(|e| CloneError::HtmlParse(format!("harvest result: {e}")))?;

        let mut seeds = collect_expected(&self.resolver, start_url, &harvest);
        info!(
            "Payload analysis of {start_url}: {} assets from DOM harvest",
            seeds.len()
        );

        let depth_reached = self.dereference_stylesheets(&mut seeds).await;
        let assets = self.size_assets(seeds).await;

        Ok(PayloadReport::build(
            start_url.to_string(),
            assets,
            depth_reached,
            self.analysis_depth,
        ))
    }

    /// Fetch each discovered stylesheet once and harvest its `@import` and
    /// `url()` references, to the configured depth. Returns the depth
    /// actually completed.
    async fn dereference_stylesheets(&self, seeds: &mut Vec<ExpectedSeed>) -> u32 {
        let mut visited: HashSet<String> = HashSet::new();
        let mut depth_reached = 0u32;

        for depth in 1..=self.analysis_depth {
            let pending: Vec<String> = seeds
                .iter()
                .filter(|s| s.asset_type == AssetType::Stylesheet && !visited.contains(&s.url))
                .map(|s| s.url.clone())
                .collect();
            if pending.is_empty() {
                depth_reached = self.analysis_depth;
                break;
            }

            let mut found_any = false;
            for css_url in pending {
                visited.insert(css_url.clone());
                let response = match self
                    .transport
                    .fetch(&css_url, &HashMap::new(), CSS_FETCH_TIMEOUT)
                    .await
                {
                    Ok(r) if (200..300).contains(&r.status) => r,
                    Ok(r) => {
                        debug!("Stylesheet dereference got {} for {css_url}", r.status);
                        continue;
                    }
                    Err(e) => {
                        debug!("Stylesheet dereference failed for {css_url}: {e}");
                        continue;
                    }
                };

                let css_text = String::from_utf8_lossy(&response.bytes).into_owned();
                for reference in extract_css_refs(&css_text) {
                    if !is_fetchable_url(&reference) {
                        continue;
                    }
                    let canonical = self.resolver.resolve(&css_url, None, &reference);
                    let asset_type = classify(&canonical, None);
                    if push_seed(seeds, canonical, asset_type, asset_type == AssetType::Font) {
                        found_any = true;
                    }
                }
            }

            depth_reached = depth;
            if !found_any {
                depth_reached = self.analysis_depth;
                break;
            }
        }

        depth_reached
    }

    /// HEAD-probe each asset for content-length, falling back to the
    /// per-type heuristic.
    async fn size_assets(&self, seeds: Vec<ExpectedSeed>) -> Vec<ExpectedAsset> {
        let transport = self.transport.clone();

        futures::stream::iter(seeds.into_iter().map(|seed| {
            let transport = transport.clone();
            async move {
                let head = transport.head(&seed.url, HEAD_TIMEOUT).await;
                let (size, measured) = match head {
                    Ok(response) if (200..400).contains(&response.status) => {
                        match response.content_length() {
                            Some(len) => (len, true),
                            None => (seed.asset_type.estimated_size(), false),
                        }
                    }
                    _ => (seed.asset_type.estimated_size(), false),
                };
                ExpectedAsset {
                    url: seed.url,
                    asset_type: seed.asset_type,
                    critical: seed.critical,
                    expected_size: size,
                    size_is_measured: measured,
                }
            }
        }))
        .buffer_unordered(HEAD_CONCURRENCY)
        .collect()
        .await
    }
}

/// Turn a raw DOM harvest into deduplicated expected-asset seeds.
///
/// Criticality: stylesheets, non-deferred/non-async scripts, favicons and
/// fonts are critical.
fn collect_expected(
    resolver: &UrlResolver,
    page_url: &str,
    harvest: &HarvestedRefs,
) -> Vec<ExpectedSeed> {
    let mut seeds: Vec<ExpectedSeed> = Vec::new();

    let add = |seeds: &mut Vec<ExpectedSeed>, raw: &str, forced_type: Option<AssetType>, critical: bool| {
        let raw = raw.trim();
        if !is_fetchable_url(raw) {
            return;
        }
        let canonical = resolver.resolve(page_url, None, raw);
        if !canonical.starts_with("http") {
            return;
        }
        let asset_type = forced_type.unwrap_or_else(|| classify(&canonical, None));
        let critical = critical || asset_type == AssetType::Font;
        push_seed(seeds, canonical, asset_type, critical);
    };

    for href in &harvest.stylesheets {
        add(&mut seeds, href, Some(AssetType::Stylesheet), true);
    }
    for script in &harvest.scripts {
        let critical = !script.defer && !script.async_load;
        add(&mut seeds, &script.url, Some(AssetType::Javascript), critical);
    }
    for src in &harvest.images {
        add(&mut seeds, src, Some(AssetType::Image), false);
    }
    for srcset in &harvest.srcsets {
        // Descriptors are discarded here; only the URLs matter.
        for candidate in parse_srcset(srcset) {
            add(&mut seeds, &candidate.url, Some(AssetType::Image), false);
        }
    }
    for src in &harvest.media {
        add(&mut seeds, src, None, false);
    }
    for href in &harvest.icons {
        add(&mut seeds, href, Some(AssetType::Image), true);
    }
    for href in &harvest.manifests {
        add(&mut seeds, href, Some(AssetType::Manifest), false);
    }
    for css in harvest.inline_css.iter().chain(&harvest.bg_images) {
        for reference in extract_css_refs(css) {
            add(&mut seeds, &reference, None, false);
        }
    }

    seeds
}

/// Insert a seed unless the URL is already present; criticality ratchets.
fn push_seed(
    seeds: &mut Vec<ExpectedSeed>,
    url: String,
    asset_type: AssetType,
    critical: bool,
) -> bool {
    if let Some(existing) = seeds.iter_mut().find(|s| s.url == url) {
        existing.critical |= critical;
        return false;
    }
    seeds.push(ExpectedSeed {
        url,
        asset_type,
        critical,
    });
    true
}
