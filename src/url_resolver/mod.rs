//! URL resolution and canonicalization
//!
//! Resolves the link forms found in real markup (absolute, scheme-relative,
//! root-relative, query-only, fragment-only, dot-segmented) against a source
//! page and an optional stack of `<base href>` values. Resolution fails soft:
//! malformed input yields the original link unchanged with a warning, never
//! an error.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use url::Url;

/// Bounded capacity for the resolution cache
const RESOLVER_CACHE_CAPACITY: usize = 2048;

/// Normalization options applied to every resolved URL
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Lowercase the host component
    pub lowercase_host: bool,
    /// Drop the fragment component
    pub strip_fragment: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            lowercase_host: true,
            strip_fragment: true,
        }
    }
}

/// Canonicalize a URL string.
///
/// Default ports are dropped, dot segments resolved, the empty path promoted
/// to `/`, the host lowercased and the fragment removed per `options`.
/// Canonicalization is idempotent: canonicalizing an already-canonical URL
/// returns it unchanged.
///
/// Returns None when the input does not parse as an absolute URL.
#[must_use]
pub fn canonicalize(url_str: &str, options: NormalizeOptions) -> Option<String> {
    let mut url = Url::parse(url_str).ok()?;

    if options.strip_fragment {
        url.set_fragment(None);
    }

    // The url crate already drops default ports and resolves dot segments;
    // hosts parse to lowercase for special schemes. Promote the empty path.
    if url.path().is_empty() {
        url.set_path("/");
    }

    if options.lowercase_host
        && let Some(host) = url.host_str()
    {
        let lower = host.to_lowercase();
        if lower != host {
            // set_host only fails for cannot-be-a-base URLs, which have
            // already parsed with a host here.
            let _ = url.set_host(Some(&lower));
        }
    }

    Some(url.to_string())
}

/// Stack-aware reference resolver with a bounded result cache
///
/// One resolver instance serves a session. The base-tag stack supports
/// nested contexts (an iframe document with its own `<base>`, a stylesheet
/// resolved relative to its own URL); the topmost non-null entry wins over
/// the page URL.
pub struct UrlResolver {
    base_stack: Mutex<Vec<Option<String>>>,
    cache: Mutex<LruCache<(String, Option<String>, String), String>>,
    options: NormalizeOptions,
}

impl UrlResolver {
    /// Create a resolver with default normalization
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(NormalizeOptions::default())
    }

    /// Create a resolver with explicit normalization options
    #[must_use]
    pub fn with_options(options: NormalizeOptions) -> Self {
        Self {
            base_stack: Mutex::new(Vec::new()),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(RESOLVER_CACHE_CAPACITY)
                    .expect("BUG: resolver cache capacity constant is zero"),
            )),
            options,
        }
    }

    /// Push a base-tag context (None for documents without a `<base>`)
    pub fn push_base(&self, base: Option<String>) {
        if let Ok(mut stack) = self.base_stack.lock() {
            stack.push(base);
        }
    }

    /// Pop the innermost base-tag context
    pub fn pop_base(&self) {
        if let Ok(mut stack) = self.base_stack.lock() {
            stack.pop();
        }
    }

    /// Topmost non-null base-tag value, if any
    fn effective_base(&self) -> Option<String> {
        let stack = self.base_stack.lock().ok()?;
        stack.iter().rev().find_map(Clone::clone)
    }

    /// Resolve a link value against the source page and active base context.
    ///
    /// Handles absolute URLs (normalized and returned), scheme-relative
    /// (`//host/...`), root-relative (`/...`), query-only (`?page=2`),
    /// fragment-only (`#top`) and dot-segmented relative references. Dot
    /// segments never escape above the root. On malformed input the original
    /// link is returned unchanged and a warning is logged.
    ///
    /// # Arguments
    /// * `source_page_url` - URL of the document containing the link
    /// * `base_tag` - Explicit base override; None consults the stack
    /// * `link` - The raw link value as written in the document
    #[must_use]
    pub fn resolve(&self, source_page_url: &str, base_tag: Option<&str>, link: &str) -> String {
        let link = link.trim();
        if link.is_empty() {
            return source_page_url.to_string();
        }

        let base_owned = base_tag.map(str::to_string).or_else(|| self.effective_base());
        let cache_key = (
            source_page_url.to_string(),
            base_owned.clone(),
            link.to_string(),
        );

        if let Ok(mut cache) = self.cache.lock()
            && let Some(hit) = cache.get(&cache_key)
        {
            return hit.clone();
        }

        let resolved = self.resolve_uncached(source_page_url, base_owned.as_deref(), link);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(cache_key, resolved.clone());
        }

        resolved
    }

    fn resolve_uncached(&self, source: &str, base: Option<&str>, link: &str) -> String {
        // Absolute links short-circuit; they only need normalization.
        if link.contains("://")
            && let Some(canonical) = canonicalize(link, self.options)
        {
            return canonical;
        }

        let source_url = match Url::parse(source) {
            Ok(u) => u,
            Err(e) => {
                log::warn!("Unparseable source page URL {source}: {e}");
                return link.to_string();
            }
        };

        // The effective base governs origin-relative resolution; a base-tag
        // value that is itself relative resolves against the page first.
        let effective = match base {
            Some(b) => match source_url.join(b) {
                Ok(joined) => joined,
                Err(e) => {
                    log::warn!("Unparseable base tag {b}: {e}");
                    source_url
                }
            },
            None => source_url,
        };

        match effective.join(link) {
            Ok(resolved) => canonicalize(resolved.as_str(), self.options)
                .unwrap_or_else(|| resolved.to_string()),
            Err(e) => {
                log::warn!("Failed to resolve link {link} against {effective}: {e}");
                link.to_string()
            }
        }
    }
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the host portion of a URL
///
/// Returns an error string when the URL has no host or does not parse.
pub fn extract_domain(url_str: &str) -> Result<String, String> {
    match Url::parse(url_str) {
        Ok(url) => url
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| format!("URL has no host: {url_str}")),
        Err(e) => Err(format!("Failed to parse URL {url_str}: {e}")),
    }
}

/// Check that a URL is fetchable over HTTP(S)
///
/// Data, javascript, mailto and blob links are not assets and are skipped.
#[must_use]
pub fn is_fetchable_url(url: &str) -> bool {
    if url.is_empty()
        || url.starts_with("data:")
        || url.starts_with("javascript:")
        || url.starts_with("mailto:")
        || url.starts_with("blob:")
        || url.starts_with('#')
    {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        // Relative references become fetchable after resolution.
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> UrlResolver {
        UrlResolver::new()
    }

    #[test]
    fn absolute_urls_are_normalized() {
        let r = resolver();
        assert_eq!(
            r.resolve("https://example.com/page", None, "HTTPS://Example.COM:443/a/../b#frag"),
            "https://example.com/b"
        );
    }

    #[test]
    fn scheme_relative_takes_source_scheme() {
        let r = resolver();
        assert_eq!(
            r.resolve("https://example.com/page", None, "//cdn.example.com/app.js"),
            "https://cdn.example.com/app.js"
        );
        assert_eq!(
            r.resolve("http://example.com/page", None, "//cdn.example.com/app.js"),
            "http://cdn.example.com/app.js"
        );
    }

    #[test]
    fn root_relative_takes_base_origin() {
        let r = resolver();
        assert_eq!(
            r.resolve("https://example.com/deep/nested/page.html", None, "/img/logo.png"),
            "https://example.com/img/logo.png"
        );
    }

    #[test]
    fn base_tag_wins_over_page_url() {
        let r = resolver();
        assert_eq!(
            r.resolve(
                "https://example.com/page.html",
                Some("https://assets.example.com/v2/"),
                "app.css"
            ),
            "https://assets.example.com/v2/app.css"
        );
    }

    #[test]
    fn base_stack_topmost_non_null_wins() {
        let r = resolver();
        r.push_base(Some("https://example.com/a/".to_string()));
        r.push_base(None);
        assert_eq!(
            r.resolve("https://example.com/index.html", None, "style.css"),
            "https://example.com/a/style.css"
        );
        r.pop_base();
        r.pop_base();
        assert_eq!(
            r.resolve("https://example.com/index.html", None, "style.css"),
            "https://example.com/style.css"
        );
    }

    #[test]
    fn dot_segments_never_escape_root() {
        let r = resolver();
        assert_eq!(
            r.resolve("https://example.com/a/page.html", None, "../../../../etc/passwd"),
            "https://example.com/etc/passwd"
        );
    }

    #[test]
    fn query_and_fragment_only_links() {
        let r = resolver();
        assert_eq!(
            r.resolve("https://example.com/list?page=1", None, "?page=2"),
            "https://example.com/list?page=2"
        );
        // Fragments are stripped by default normalization.
        assert_eq!(
            r.resolve("https://example.com/doc", None, "#section"),
            "https://example.com/doc"
        );
    }

    #[test]
    fn malformed_input_fails_soft() {
        let r = resolver();
        assert_eq!(r.resolve("not a url", None, "still not a url"), "still not a url");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let opts = NormalizeOptions::default();
        let inputs = [
            "https://Example.com:443/a/./b/../c?x=1#frag",
            "http://example.com",
            "https://example.com/path/",
        ];
        for input in inputs {
            let once = canonicalize(input, opts).expect("canonical");
            let twice = canonicalize(&once, opts).expect("canonical twice");
            assert_eq!(once, twice, "canonicalize not idempotent for {input}");
        }
    }

    #[test]
    fn empty_path_promoted_to_slash() {
        assert_eq!(
            canonicalize("https://example.com", NormalizeOptions::default()),
            Some("https://example.com/".to_string())
        );
    }

    #[test]
    fn fetchable_url_filtering() {
        assert!(is_fetchable_url("https://example.com/a.css"));
        assert!(is_fetchable_url("img/logo.png"));
        assert!(!is_fetchable_url("data:image/png;base64,AAAA"));
        assert!(!is_fetchable_url("javascript:void(0)"));
        assert!(!is_fetchable_url("mailto:x@example.com"));
        assert!(!is_fetchable_url("#top"));
        assert!(!is_fetchable_url(""));
    }
}
