//! Static extraction path
//!
//! Parses markup with an HTML-aware parser and pulls assets from the
//! attributes visible without executing script. Runs on the blocking pool
//! under a timeout; parsing a pathological page must not stall the crawl.

use lazy_static::lazy_static;
use scraper::{Html, Selector};
use std::time::Duration;

use crate::error::{CloneError, CloneResult};
use crate::rewriter::parse_srcset;

lazy_static! {
    static ref IMG_SELECTOR: Selector =
        Selector::parse("img[src]").expect("BUG: hardcoded img selector is invalid");
    static ref SCRIPT_SELECTOR: Selector =
        Selector::parse("script[src]").expect("BUG: hardcoded script selector is invalid");
    static ref STYLESHEET_SELECTOR: Selector = Selector::parse("link[rel=\"stylesheet\"]")
        .expect("BUG: hardcoded stylesheet selector is invalid");
    static ref ANCHOR_SELECTOR: Selector =
        Selector::parse("a[href]").expect("BUG: hardcoded anchor selector is invalid");
    static ref STYLED_SELECTOR: Selector =
        Selector::parse("[style]").expect("BUG: hardcoded style selector is invalid");
    static ref SRCSET_SELECTOR: Selector =
        Selector::parse("img[srcset], source[srcset]").expect("BUG: hardcoded srcset selector is invalid");
    static ref BASE_SELECTOR: Selector =
        Selector::parse("base[href]").expect("BUG: hardcoded base selector is invalid");
}

/// Raw references pulled from parsed markup, unresolved
#[derive(Debug, Clone, Default)]
pub struct StaticExtraction {
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
    pub images: Vec<String>,
    /// Inline style attribute texts containing url() references
    pub inline_styles: Vec<String>,
    /// Anchor hrefs for link crawling
    pub links: Vec<String>,
    /// First `<base href>` value, if present
    pub base_href: Option<String>,
}

/// Parse and extract under a timeout.
///
/// The parse runs entirely on a blocking thread (the parsed document is
/// not `Send`); only the extracted strings cross back. On timeout the
/// caller falls back to dynamic processing if permitted.
pub async fn extract_static(html: String, timeout: Duration) -> CloneResult<StaticExtraction> {
    let task = tokio::task::spawn_blocking(move || extract_sync(&html));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(extraction)) => Ok(extraction),
        Ok(Err(join_err)) => Err(CloneError::HtmlParse(format!(
            "static parse task panicked: {join_err}"
        ))),
        Err(_) => Err(CloneError::Timeout(timeout)),
    }
}

/// Synchronous extraction over a parsed document
#[must_use]
pub fn extract_sync(html: &str) -> StaticExtraction {
    let document = Html::parse_document(html);
    let mut extraction = StaticExtraction::default();

    extraction.base_href = document
        .select(&BASE_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string);

    for element in document.select(&STYLESHEET_SELECTOR) {
        if let Some(href) = element.value().attr("href") {
            extraction.stylesheets.push(href.to_string());
        }
    }
    for element in document.select(&SCRIPT_SELECTOR) {
        if let Some(src) = element.value().attr("src") {
            extraction.scripts.push(src.to_string());
        }
    }
    for element in document.select(&IMG_SELECTOR) {
        if let Some(src) = element.value().attr("src") {
            if !src.starts_with("data:") {
                extraction.images.push(src.to_string());
            }
        }
    }
    for element in document.select(&SRCSET_SELECTOR) {
        if let Some(srcset) = element.value().attr("srcset") {
            for candidate in parse_srcset(srcset) {
                extraction.images.push(candidate.url);
            }
        }
    }
    for element in document.select(&STYLED_SELECTOR) {
        if let Some(style) = element.value().attr("style") {
            if style.contains("url(") {
                extraction.inline_styles.push(style.to_string());
            }
        }
    }
    for element in document.select(&ANCHOR_SELECTOR) {
        if let Some(href) = element.value().attr("href") {
            let href = href.trim();
            if !href.is_empty()
                && !href.starts_with('#')
                && !href.starts_with("javascript:")
                && !href.starts_with("mailto:")
            {
                extraction.links.push(href.to_string());
            }
        }
    }

    extraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_static_reference_kinds() {
        let html = r##"
            <html><head>
                <base href="/app/">
                <link rel="stylesheet" href="/css/app.css">
            </head><body>
                <script src="/js/main.js"></script>
                <img src="/img/a.png">
                <img srcset="/img/b.png 1x, /img/b@2x.png 2x" src="/img/b.png">
                <div style="background: url(/img/bg.png)"></div>
                <a href="/about">About</a>
                <a href="#section">Skip</a>
                <a href="javascript:void(0)">Skip too</a>
            </body></html>
        "##;
        let extraction = extract_sync(html);

        assert_eq!(extraction.base_href.as_deref(), Some("/app/"));
        assert_eq!(extraction.stylesheets, vec!["/css/app.css"]);
        assert_eq!(extraction.scripts, vec!["/js/main.js"]);
        assert!(extraction.images.contains(&"/img/a.png".to_string()));
        assert!(extraction.images.contains(&"/img/b@2x.png".to_string()));
        assert_eq!(extraction.inline_styles.len(), 1);
        assert_eq!(extraction.links, vec!["/about"]);
    }

    #[test]
    fn data_urls_are_skipped() {
        let html = r#"<img src="data:image/png;base64,AAAA">"#;
        let extraction = extract_sync(html);
        assert!(extraction.images.is_empty());
    }

    #[tokio::test]
    async fn async_extraction_completes_within_timeout() {
        let extraction = extract_static(
            r#"<img src="/a.png">"#.to_string(),
            Duration::from_secs(5),
        )
        .await
        .expect("extract");
        assert_eq!(extraction.images, vec!["/a.png"]);
    }
}
