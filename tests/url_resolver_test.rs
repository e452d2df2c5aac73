//! URL resolution and canonicalization properties

use proptest::prelude::*;
use sitemirror::url_resolver::{canonicalize, NormalizeOptions, UrlResolver};

#[test]
fn resolves_every_link_form() {
    let resolver = UrlResolver::new();
    let page = "https://example.com/docs/guide/page.html";

    assert_eq!(
        resolver.resolve(page, None, "https://cdn.example.com/a.css"),
        "https://cdn.example.com/a.css"
    );
    assert_eq!(
        resolver.resolve(page, None, "//cdn.example.com/a.js"),
        "https://cdn.example.com/a.js"
    );
    assert_eq!(
        resolver.resolve(page, None, "/img/logo.png"),
        "https://example.com/img/logo.png"
    );
    assert_eq!(
        resolver.resolve(page, None, "../shared/style.css"),
        "https://example.com/docs/shared/style.css"
    );
    assert_eq!(
        resolver.resolve(page, None, "sibling.html"),
        "https://example.com/docs/guide/sibling.html"
    );
    assert_eq!(
        resolver.resolve(page, None, "?page=2"),
        "https://example.com/docs/guide/page.html?page=2"
    );
}

#[test]
fn default_ports_are_dropped() {
    let opts = NormalizeOptions::default();
    assert_eq!(
        canonicalize("https://example.com:443/a", opts),
        Some("https://example.com/a".to_string())
    );
    assert_eq!(
        canonicalize("http://example.com:80/a", opts),
        Some("http://example.com/a".to_string())
    );
    // Non-default ports survive.
    assert_eq!(
        canonicalize("http://example.com:8080/a", opts),
        Some("http://example.com:8080/a".to_string())
    );
}

#[test]
fn repeated_resolution_is_cached_and_stable() {
    let resolver = UrlResolver::new();
    let first = resolver.resolve("https://example.com/a/", None, "b/c.png");
    let second = resolver.resolve("https://example.com/a/", None, "b/c.png");
    assert_eq!(first, second);
}

proptest! {
    /// canonicalize(canonicalize(u)) == canonicalize(u) for any URL that
    /// canonicalizes at all.
    #[test]
    fn canonicalize_is_idempotent(
        host in "[a-z][a-z0-9]{0,10}\\.(com|org|net)",
        path in "(/[a-zA-Z0-9._~-]{0,8}){0,4}",
        query in proptest::option::of("[a-z]{1,6}=[a-z0-9]{1,6}"),
    ) {
        let url = match &query {
            Some(q) => format!("https://{host}{path}?{q}"),
            None => format!("https://{host}{path}"),
        };
        let opts = NormalizeOptions::default();
        if let Some(once) = canonicalize(&url, opts) {
            let twice = canonicalize(&once, opts);
            prop_assert_eq!(Some(once), twice);
        }
    }

    /// Dot segments never climb above the root.
    #[test]
    fn dot_segments_stay_under_root(
        ups in 1usize..8,
        segment in "[a-z]{1,8}",
    ) {
        let resolver = UrlResolver::new();
        let link = format!("{}{segment}", "../".repeat(ups));
        let resolved = resolver.resolve("https://example.com/a/b/", None, &link);
        prop_assert!(resolved.starts_with("https://example.com/"));
        prop_assert!(!resolved.contains(".."));
    }
}
