//! Recursive asset discovery
//!
//! After the first fetch pass, downloaded CSS, JS and HTML are re-scanned
//! for references that were invisible to first-pass discovery: transitive
//! `@import` chains, URLs buried in script string literals and dynamic
//! imports, lazy-loading data attributes. Each pass feeds newly found
//! assets back through the fetch pipeline; the procedure stops at a
//! fixpoint or after a bounded number of passes.

use dashmap::DashSet;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

use crate::assets::{classify, Asset, AssetTable, AssetType, DiscoveryMethod, DownloadStatus};
use crate::fetch::FetchPipeline;
use crate::rewriter::{extract_css_refs, parse_srcset};
use crate::url_resolver::{is_fetchable_url, UrlResolver};
use crate::utils::constants::MAX_DISCOVERY_PASSES;

lazy_static! {
    // Quoted string literals whose value looks like an asset path.
    static ref JS_ASSET_LITERAL_RE: Regex = Regex::new(
        r#"['"`]([^'"`\s]+?\.(?:png|jpe?g|gif|webp|svg|ico|avif|css|js|mjs|woff2?|ttf|otf|eot|mp4|webm|mp3|ogg|wav|glb|gltf|hdr|ktx2?|json)(?:\?[^'"`\s]*)?)['"`]"#
    )
    .expect("BUG: hardcoded js literal regex is invalid");

    // import("...") dynamic imports.
    static ref JS_DYNAMIC_IMPORT_RE: Regex =
        Regex::new(r#"import\(\s*['"`]([^'"`]+)['"`]\s*\)"#)
            .expect("BUG: hardcoded dynamic import regex is invalid");

    // Lazy-loading data attributes.
    static ref HTML_DATA_ATTR_RE: Regex = Regex::new(
        r#"data-(?:src|lazy|original|bg|background)\s*=\s*["']([^"']+)["']"#
    )
    .expect("BUG: hardcoded data attribute regex is invalid");

    // srcset attributes in raw HTML.
    static ref HTML_SRCSET_RE: Regex = Regex::new(r#"srcset\s*=\s*["']([^"']+)["']"#)
        .expect("BUG: hardcoded srcset regex is invalid");
}

/// Scan JavaScript source for asset-shaped string literals and dynamic
/// imports.
#[must_use]
pub fn scan_js(source: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for captures in JS_ASSET_LITERAL_RE.captures_iter(source) {
        if let Some(m) = captures.get(1) {
            refs.push(m.as_str().to_string());
        }
    }
    for captures in JS_DYNAMIC_IMPORT_RE.captures_iter(source) {
        if let Some(m) = captures.get(1) {
            refs.push(m.as_str().to_string());
        }
    }
    dedupe(refs)
}

/// Scan raw HTML for lazy-loading data attributes and srcset URLs.
#[must_use]
pub fn scan_html(source: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for captures in HTML_DATA_ATTR_RE.captures_iter(source) {
        if let Some(m) = captures.get(1) {
            refs.push(m.as_str().to_string());
        }
    }
    for captures in HTML_SRCSET_RE.captures_iter(source) {
        if let Some(m) = captures.get(1) {
            for candidate in parse_srcset(m.as_str()) {
                refs.push(candidate.url);
            }
        }
    }
    dedupe(refs)
}

/// Scan a stylesheet for `url(...)` and `@import` references.
#[must_use]
pub fn scan_css(source: &str) -> Vec<String> {
    extract_css_refs(source)
}

fn dedupe(mut refs: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    refs.retain(|r| seen.insert(r.clone()));
    refs
}

/// Outcome of the recursive discovery procedure
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Passes actually run
    pub passes: usize,
    /// Assets added across all passes
    pub new_assets: usize,
    /// Assets fetched successfully
    pub fetched: usize,
    /// Assets whose fetch failed
    pub failed: usize,
}

/// Multi-pass recursive discovery over downloaded content
pub struct RecursiveDiscovery {
    table: Arc<AssetTable>,
    resolver: Arc<UrlResolver>,
    scanned: DashSet<String>,
}

impl RecursiveDiscovery {
    /// Create a discovery engine over the session table.
    #[must_use]
    pub fn new(table: Arc<AssetTable>, resolver: Arc<UrlResolver>) -> Self {
        Self {
            table,
            resolver,
            scanned: DashSet::new(),
        }
    }

    /// Run passes until no pass adds assets, bounded by
    /// `MAX_DISCOVERY_PASSES`. Newly discovered assets re-enter the fetch
    /// pipeline before the next pass so their contents are scanned too.
    ///
    /// # Arguments
    /// * `pipeline` - Fetch pipeline for newly discovered assets
    /// * `output_root` - Root under which downloaded files live
    pub async fn run(&self, pipeline: &FetchPipeline, output_root: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for pass in 1..=MAX_DISCOVERY_PASSES {
            let added = self.scan_pass(output_root).await;
            if added.is_empty() {
                debug!("Recursive discovery pass {pass}: fixpoint reached");
                break;
            }

            report.passes = pass;
            report.new_assets += added.len();
            info!("Recursive discovery pass {pass}: {} new assets", added.len());

            for url in added {
                match pipeline.fetch(&url).await {
                    Ok(asset) if asset.status == DownloadStatus::Downloaded => {
                        report.fetched += 1;
                    }
                    Ok(_) => report.failed += 1,
                    Err(e) => {
                        debug!("Recursive fetch failed for {url}: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    /// One pass: scan every not-yet-scanned downloaded CSS/JS/HTML file and
    /// insert new references. Returns URLs of assets added this pass.
    async fn scan_pass(&self, output_root: &Path) -> Vec<String> {
        let mut added = Vec::new();

        for asset in self.table.snapshot() {
            if asset.status != DownloadStatus::Downloaded {
                continue;
            }
            let (method, scanner): (DiscoveryMethod, fn(&str) -> Vec<String>) =
                match asset.asset_type {
                    AssetType::Stylesheet => (DiscoveryMethod::RecursiveCss, scan_css),
                    AssetType::Javascript => (DiscoveryMethod::RecursiveJs, scan_js),
                    AssetType::Html => (DiscoveryMethod::RecursiveHtml, scan_html),
                    _ => continue,
                };
            if !self.scanned.insert(asset.url.clone()) {
                continue;
            }

            let Some(local) = &asset.local_path else {
                continue;
            };
            let content = match tokio::fs::read_to_string(output_root.join(local)).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("Cannot rescan {local}: {e}");
                    continue;
                }
            };

            for reference in scanner(&content) {
                if !is_fetchable_url(&reference) {
                    continue;
                }
                let canonical = self.resolver.resolve(&asset.url, None, &reference);
                // Never re-enter settled URLs.
                if self.table.contains(&canonical) {
                    continue;
                }
                let new_asset = Asset::new(
                    canonical.clone(),
                    reference,
                    classify(&canonical, None),
                    method,
                );
                if self.table.insert(new_asset) {
                    added.push(canonical);
                }
            }
        }

        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_scanner_finds_literals_and_dynamic_imports() {
        let js = r#"
            const hero = "/img/hero.webp";
            const sheet = '/css/extra.css?v=2';
            preload(`/fonts/inter.woff2`);
            const mod = import("./chunks/settings.js");
            const notAsset = "just a string";
        "#;
        let refs = scan_js(js);
        assert!(refs.contains(&"/img/hero.webp".to_string()));
        assert!(refs.contains(&"/css/extra.css?v=2".to_string()));
        assert!(refs.contains(&"/fonts/inter.woff2".to_string()));
        assert!(refs.contains(&"./chunks/settings.js".to_string()));
        assert!(!refs.iter().any(|r| r.contains("just a string")));
    }

    #[test]
    fn html_scanner_finds_data_attrs_and_srcset() {
        let html = r#"
            <img data-src="/img/lazy.png" src="placeholder.gif">
            <div data-bg="/img/section-bg.jpg"></div>
            <img srcset="/img/a.png 1x, /img/a@2x.png 2x">
        "#;
        let refs = scan_html(html);
        assert!(refs.contains(&"/img/lazy.png".to_string()));
        assert!(refs.contains(&"/img/section-bg.jpg".to_string()));
        assert!(refs.contains(&"/img/a.png".to_string()));
        assert!(refs.contains(&"/img/a@2x.png".to_string()));
    }

    #[test]
    fn css_scanner_finds_imports_and_urls() {
        let css = "@import url(./fonts.css);\nbody { background: url(../img/bg.png); }";
        let refs = scan_css(css);
        assert_eq!(refs, vec!["./fonts.css", "../img/bg.png"]);
    }

    #[tokio::test]
    async fn scan_pass_inserts_with_recursive_method() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = Arc::new(AssetTable::new());

        // Seed a downloaded stylesheet on disk.
        let css_url = "https://example.com/css/main.css";
        table.insert(Asset::new(
            css_url.to_string(),
            css_url.to_string(),
            AssetType::Stylesheet,
            DiscoveryMethod::DomScan,
        ));
        table.begin_download(css_url);
        tokio::fs::create_dir_all(dir.path().join("css")).await.expect("mkdir");
        tokio::fs::write(
            dir.path().join("css/main.css"),
            "@import url(./fonts.css);\nbody { background: url(../img/bg.png); }",
        )
        .await
        .expect("write css");
        table.commit_download(css_url, "css/main.css".to_string(), 10, "x".to_string(), None);

        let discovery = RecursiveDiscovery::new(Arc::clone(&table), Arc::new(UrlResolver::new()));
        let added = discovery.scan_pass(dir.path()).await;

        assert_eq!(added.len(), 2);
        let fonts = table
            .get("https://example.com/css/fonts.css")
            .expect("fonts asset");
        assert_eq!(fonts.discovery_method, DiscoveryMethod::RecursiveCss);
        let bg = table.get("https://example.com/img/bg.png").expect("bg asset");
        assert_eq!(bg.discovery_method, DiscoveryMethod::RecursiveCss);

        // Second pass is a fixpoint: nothing new, nothing re-entered.
        let again = discovery.scan_pass(dir.path()).await;
        assert!(again.is_empty());
    }
}
