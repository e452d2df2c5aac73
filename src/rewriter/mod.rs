//! Build-tool-aware reference rewriting
//!
//! Ties the streaming HTML rewriter and the CSS rewriter to the asset
//! table: each reference is resolved to its canonical URL, looked up, and
//! replaced with a path relative to the file being rewritten. Only
//! downloaded assets are rewritten; everything else keeps its original
//! reference.

pub mod css;
pub mod html;
pub mod srcset;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assets::{AssetTable, DownloadStatus};
use crate::error::CloneResult;
use crate::url_resolver::UrlResolver;

pub use css::{extract_css_refs, relative_between, rewrite_css_refs};
pub use html::{page_filename_for_path, rewrite_html, RewriteLookups};
pub use srcset::{format_srcset, parse_srcset, SrcsetCandidate};

/// Table-backed rewriter for a session
pub struct Rewriter {
    table: Arc<AssetTable>,
    resolver: Arc<UrlResolver>,
    /// Canonical page URL -> flattened local filename (files known to exist)
    routes: HashMap<String, String>,
}

impl Rewriter {
    /// Create a rewriter over the session's asset table.
    #[must_use]
    pub fn new(table: Arc<AssetTable>, resolver: Arc<UrlResolver>) -> Self {
        Self {
            table,
            resolver,
            routes: HashMap::new(),
        }
    }

    /// Register a saved page so links to it rewrite to its local file.
    pub fn register_page(&mut self, canonical_url: &str, local_filename: &str) {
        self.routes
            .insert(canonical_url.to_string(), local_filename.to_string());
    }

    /// Rewrite a page.
    ///
    /// # Arguments
    /// * `html` - Page markup
    /// * `page_url` - Canonical URL of the page
    /// * `page_local_path` - Path of the saved page relative to the output root
    pub fn rewrite_page(
        &self,
        html: &str,
        page_url: &str,
        page_local_path: &Path,
    ) -> CloneResult<(String, usize)> {
        let asset = |reference: &str| self.asset_target(reference, page_url, page_local_path);
        let route = |href: &str| self.route_target(href, page_url, page_local_path);
        rewrite_html(html, &RewriteLookups { asset: &asset, route: &route })
    }

    /// Rewrite a stylesheet; emitted paths are relative to the stylesheet.
    ///
    /// # Arguments
    /// * `css` - Stylesheet source
    /// * `css_url` - Canonical URL the stylesheet was fetched from
    /// * `css_local_path` - Path of the saved sheet relative to the output root
    #[must_use]
    pub fn rewrite_stylesheet(
        &self,
        css: &str,
        css_url: &str,
        css_local_path: &Path,
    ) -> (String, usize) {
        rewrite_css_refs(css, |reference| {
            self.asset_target(reference, css_url, css_local_path)
        })
    }

    /// Replacement path for one asset reference, or None to keep it.
    fn asset_target(&self, reference: &str, source_url: &str, source_path: &Path) -> Option<String> {
        if !crate::url_resolver::is_fetchable_url(reference) {
            return None;
        }
        let canonical = self.resolver.resolve(source_url, None, reference);
        let asset = self.table.get(&canonical)?;
        if asset.status != DownloadStatus::Downloaded {
            return None;
        }
        let local = asset.local_path?;
        relative_between(source_path, &PathBuf::from(local))
    }

    /// Replacement for an SPA route / page link, or None to keep it.
    fn route_target(&self, href: &str, source_url: &str, source_path: &Path) -> Option<String> {
        if !crate::url_resolver::is_fetchable_url(href) {
            return None;
        }
        let canonical = self.resolver.resolve(source_url, None, href);
        let filename = self.routes.get(&canonical)?;
        relative_between(source_path, &PathBuf::from(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{classify, Asset, DiscoveryMethod};

    fn table_with_downloaded(entries: &[(&str, &str)]) -> Arc<AssetTable> {
        let table = Arc::new(AssetTable::new());
        for (url, local) in entries {
            table.insert(Asset::new(
                (*url).to_string(),
                (*url).to_string(),
                classify(url, None),
                DiscoveryMethod::DomScan,
            ));
            table.begin_download(url);
            table.commit_download(
                url,
                (*local).to_string(),
                1,
                "deadbeef".to_string(),
                None,
            );
        }
        table
    }

    #[test]
    fn page_rewrite_emits_paths_relative_to_page() {
        let table = table_with_downloaded(&[
            ("https://example.com/css/app.css", "css/app.css"),
            ("https://example.com/img/a.png", "img/a.png"),
        ]);
        let rewriter = Rewriter::new(table, Arc::new(UrlResolver::new()));

        let html = r#"<head><link rel="stylesheet" href="/css/app.css"></head>
            <img src="../img/a.png">"#;
        let (out, count) = rewriter
            .rewrite_page(html, "https://example.com/sub/page", Path::new("_sub_page.html"))
            .expect("rewrite");

        assert_eq!(count, 2);
        assert!(out.contains(r#"href="css/app.css""#));
        assert!(out.contains(r#"src="img/a.png""#));
    }

    #[test]
    fn stylesheet_rewrite_is_relative_to_the_sheet() {
        let table = table_with_downloaded(&[
            ("https://example.com/fonts.css", "css/fonts.css"),
            ("https://example.com/img/bg.png", "img/bg.png"),
        ]);
        let rewriter = Rewriter::new(table, Arc::new(UrlResolver::new()));

        let css = "@import url(../fonts.css);\nbody { background: url(../img/bg.png); }";
        let (out, count) = rewriter.rewrite_stylesheet(
            css,
            "https://example.com/styles/main.css",
            Path::new("css/main.css"),
        );

        assert_eq!(count, 2);
        assert!(out.contains("url(fonts.css)"));
        assert!(out.contains("url(../img/bg.png)"));
    }

    #[test]
    fn pending_assets_keep_original_references() {
        let table = Arc::new(AssetTable::new());
        table.insert(Asset::new(
            "https://example.com/late.png".to_string(),
            "/late.png".to_string(),
            classify("https://example.com/late.png", None),
            DiscoveryMethod::DomScan,
        ));
        let rewriter = Rewriter::new(table, Arc::new(UrlResolver::new()));

        let (out, count) = rewriter
            .rewrite_page(
                r#"<img src="/late.png">"#,
                "https://example.com/",
                Path::new("index.html"),
            )
            .expect("rewrite");

        assert_eq!(count, 0);
        assert!(out.contains(r#"src="/late.png""#));
    }

    #[test]
    fn registered_routes_rewrite_page_links() {
        let table = Arc::new(AssetTable::new());
        let mut rewriter = Rewriter::new(table, Arc::new(UrlResolver::new()));
        rewriter.register_page("https://example.com/about", "_about.html");

        let (out, count) = rewriter
            .rewrite_page(
                r#"<a href="/about">About</a><a href="/missing">Missing</a>"#,
                "https://example.com/",
                Path::new("index.html"),
            )
            .expect("rewrite");

        assert_eq!(count, 1);
        assert!(out.contains(r#"href="_about.html""#));
        assert!(out.contains(r#"href="/missing""#));
    }
}
