//! Streaming HTML rewriting
//!
//! Uses lol_html to rewrite asset references in a single pass: link and
//! script sources, image `src` and `srcset` (descriptors preserved), media
//! elements and their `<source>` children, inline `<style>` contents and
//! per-element `style` attributes. Every page gains a `<base href="./">`
//! when one is absent; SPA route links are pointed at their flattened
//! local files and `router-link-active` markers are stripped.
//!
//! Per-reference failures keep the original value, which also makes the
//! whole pass idempotent: a reference already rewritten to a relative path
//! no longer resolves to a tracked asset and is left untouched.

use lazy_static::lazy_static;
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, text, HtmlRewriter, Settings};
use regex::Regex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::css::rewrite_css_refs;
use super::srcset::{format_srcset, parse_srcset};
use crate::error::{CloneError, CloneResult};

lazy_static! {
    static ref BASE_TAG_RE: Regex =
        Regex::new(r"(?i)<base\b").expect("BUG: hardcoded base-tag regex is invalid");
}

/// Lookups the rewriter needs from its caller
///
/// Both closures receive references exactly as written in the markup.
/// `asset` returns the replacement path (already relative to the page) or
/// None to leave the reference alone; `route` does the same for page
/// links.
pub struct RewriteLookups<'a> {
    pub asset: &'a dyn Fn(&str) -> Option<String>,
    pub route: &'a dyn Fn(&str) -> Option<String>,
}

/// Rewrite a page's markup against the asset table lookups.
///
/// Returns the rewritten HTML and the number of references rewritten.
pub fn rewrite_html(html: &str, lookups: &RewriteLookups<'_>) -> CloneResult<(String, usize)> {
    let count = AtomicUsize::new(0);
    let mut output = Vec::with_capacity(html.len() + 64);

    let needs_base = !BASE_TAG_RE.is_match(html);
    let asset = lookups.asset;
    let route = lookups.route;

    // Inline <style> text arrives in chunks; buffer until the last one.
    let style_buffer = RefCell::new(String::new());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("head", move |el| {
                    if needs_base {
                        el.prepend("<base href=\"./\">", ContentType::Html);
                    }
                    Ok(())
                }),
                element!("link[href]", |el| {
                    rewrite_attr(el, "href", asset, &count);
                    Ok(())
                }),
                element!("script[src]", |el| {
                    rewrite_attr(el, "src", asset, &count);
                    Ok(())
                }),
                element!("img", |el| {
                    rewrite_attr(el, "src", asset, &count);
                    rewrite_srcset(el, asset, &count);
                    Ok(())
                }),
                element!("video", |el| {
                    rewrite_attr(el, "src", asset, &count);
                    rewrite_attr(el, "poster", asset, &count);
                    Ok(())
                }),
                element!("audio", |el| {
                    rewrite_attr(el, "src", asset, &count);
                    Ok(())
                }),
                element!("source", |el| {
                    rewrite_attr(el, "src", asset, &count);
                    rewrite_srcset(el, asset, &count);
                    Ok(())
                }),
                // Per-element style attributes carry url(...) references.
                element!("*[style]", |el| {
                    if let Some(style) = el.get_attribute("style") {
                        let (rewritten, n) = rewrite_css_refs(&style, |r| asset(r));
                        if n > 0 && el.set_attribute("style", &rewritten).is_ok() {
                            count.fetch_add(n, Ordering::Relaxed);
                        }
                    }
                    Ok(())
                }),
                // SPA route links and router marker classes.
                element!("a[href]", |el| {
                    if let Some(href) = el.get_attribute("href")
                        && let Some(local) = route(href.trim())
                    {
                        if el.set_attribute("href", &local).is_ok() {
                            count.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    if let Some(class) = el.get_attribute("class") {
                        let stripped: Vec<&str> = class
                            .split_whitespace()
                            .filter(|c| {
                                *c != "router-link-active" && *c != "router-link-exact-active"
                            })
                            .collect();
                        if stripped.len() != class.split_whitespace().count() {
                            if stripped.is_empty() {
                                el.remove_attribute("class");
                            } else {
                                let _ = el.set_attribute("class", &stripped.join(" "));
                            }
                        }
                    }
                    Ok(())
                }),
                text!("style", |chunk| {
                    style_buffer.borrow_mut().push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        let buffered = std::mem::take(&mut *style_buffer.borrow_mut());
                        let (rewritten, n) = rewrite_css_refs(&buffered, |r| asset(r));
                        if n > 0 {
                            count.fetch_add(n, Ordering::Relaxed);
                        }
                        chunk.replace(&rewritten, ContentType::Html);
                    } else {
                        chunk.remove();
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|e| CloneError::HtmlParse(e.to_string()))?;
    rewriter
        .end()
        .map_err(|e| CloneError::HtmlParse(e.to_string()))?;

    let result =
        String::from_utf8(output).map_err(|e| CloneError::HtmlParse(e.to_string()))?;
    Ok((result, count.load(Ordering::Relaxed)))
}

/// Rewrite one attribute through the asset lookup, keeping the original
/// on failure.
fn rewrite_attr(
    el: &mut Element,
    attr: &str,
    asset: &dyn Fn(&str) -> Option<String>,
    count: &AtomicUsize,
) {
    if let Some(value) = el.get_attribute(attr)
        && let Some(replacement) = asset(value.trim())
    {
        if el.set_attribute(attr, &replacement).is_ok() {
            count.fetch_add(1, Ordering::Relaxed);
        } else {
            log::warn!("Failed to set {attr} attribute, keeping original: {value}");
        }
    }
}

/// Rewrite a srcset attribute candidate-by-candidate, descriptors intact.
fn rewrite_srcset(
    el: &mut Element,
    asset: &dyn Fn(&str) -> Option<String>,
    count: &AtomicUsize,
) {
    if let Some(value) = el.get_attribute("srcset") {
        let mut candidates = parse_srcset(&value);
        let mut changed = false;
        for candidate in &mut candidates {
            if let Some(replacement) = asset(&candidate.url) {
                candidate.url = replacement;
                changed = true;
            }
        }
        if changed && el.set_attribute("srcset", &format_srcset(&candidates)).is_ok() {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Flattened local filename for a page pathname.
///
/// The root page is `index.html`; other pages replace `/` with `_`
/// (`/about/team` becomes `_about_team.html`).
#[must_use]
pub fn page_filename_for_path(pathname: &str) -> String {
    if pathname.is_empty() || pathname == "/" {
        return "index.html".to_string();
    }
    let flattened = pathname.replace('/', "_");
    let flattened = flattened.trim_end_matches('_');
    if flattened.ends_with(".html") || flattened.ends_with(".htm") {
        flattened.to_string()
    } else {
        format!("{flattened}.html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_map(map: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |r: &str| map.get(r).map(|s| (*s).to_string())
    }

    #[test]
    fn rewrites_core_references() {
        let html = r#"<html><head><link rel="stylesheet" href="/css/app.css"></head>
            <body><script src="/js/app.js"></script><img src="/img/a.png"></body></html>"#;
        let asset = lookup_map(HashMap::from([
            ("/css/app.css", "css/app.css"),
            ("/js/app.js", "js/app.js"),
            ("/img/a.png", "img/a.png"),
        ]));
        let route = |_: &str| None;
        let (out, count) = rewrite_html(html, &RewriteLookups { asset: &asset, route: &route })
            .expect("rewrite");

        assert_eq!(count, 3);
        assert!(out.contains(r#"href="css/app.css""#));
        assert!(out.contains(r#"src="js/app.js""#));
        assert!(out.contains(r#"src="img/a.png""#));
    }

    #[test]
    fn srcset_descriptors_are_preserved() {
        let html = r#"<img srcset="/img/a.png 1x, /img/a@2x.png 2x">"#;
        let asset = lookup_map(HashMap::from([
            ("/img/a.png", "img/a.png"),
            ("/img/a@2x.png", "img/a@2x.png"),
        ]));
        let route = |_: &str| None;
        let (out, _) = rewrite_html(html, &RewriteLookups { asset: &asset, route: &route })
            .expect("rewrite");
        assert!(out.contains(r#"srcset="img/a.png 1x, img/a@2x.png 2x""#));
    }

    #[test]
    fn base_href_added_once() {
        let html = "<html><head><title>t</title></head><body></body></html>";
        let asset = |_: &str| None;
        let route = |_: &str| None;
        let lookups = RewriteLookups { asset: &asset, route: &route };

        let (once, _) = rewrite_html(html, &lookups).expect("first pass");
        assert!(once.contains(r#"<base href="./">"#));

        let (twice, _) = rewrite_html(&once, &lookups).expect("second pass");
        assert_eq!(once, twice, "rewriting must be idempotent");
    }

    #[test]
    fn existing_base_is_kept() {
        let html = r#"<html><head><base href="/app/"></head><body></body></html>"#;
        let asset = |_: &str| None;
        let route = |_: &str| None;
        let (out, _) = rewrite_html(html, &RewriteLookups { asset: &asset, route: &route })
            .expect("rewrite");
        assert_eq!(out.matches("<base").count(), 1);
        assert!(out.contains(r#"<base href="/app/">"#));
    }

    #[test]
    fn spa_routes_map_to_flattened_files() {
        let html = r##"<a href="/about" class="nav router-link-active">About</a>"##;
        let asset = |_: &str| None;
        let route = |href: &str| (href == "/about").then(|| "_about.html".to_string());
        let (out, count) = rewrite_html(html, &RewriteLookups { asset: &asset, route: &route })
            .expect("rewrite");

        assert_eq!(count, 1);
        assert!(out.contains(r#"href="_about.html""#));
        assert!(!out.contains("router-link-active"));
        assert!(out.contains(r#"class="nav""#));
    }

    #[test]
    fn inline_style_and_style_attributes_are_rewritten() {
        let html = r#"<head><style>body { background: url(/img/bg.png); }</style></head>
            <div style="background-image: url(/img/tile.png)"></div>"#;
        let asset = lookup_map(HashMap::from([
            ("/img/bg.png", "img/bg.png"),
            ("/img/tile.png", "img/tile.png"),
        ]));
        let route = |_: &str| None;
        let (out, count) = rewrite_html(html, &RewriteLookups { asset: &asset, route: &route })
            .expect("rewrite");

        assert_eq!(count, 2);
        assert!(out.contains("url(img/bg.png)"));
        assert!(out.contains("url(img/tile.png)"));
    }

    #[test]
    fn unresolvable_references_survive() {
        let html = r#"<img src="/img/unknown.png"><video src="/v/clip.mp4" poster="/img/p.jpg"></video>"#;
        let asset = lookup_map(HashMap::from([("/v/clip.mp4", "media/clip.mp4")]));
        let route = |_: &str| None;
        let (out, count) = rewrite_html(html, &RewriteLookups { asset: &asset, route: &route })
            .expect("rewrite");

        assert_eq!(count, 1);
        assert!(out.contains(r#"src="/img/unknown.png""#));
        assert!(out.contains(r#"src="media/clip.mp4""#));
        assert!(out.contains(r#"poster="/img/p.jpg""#));
    }

    #[test]
    fn page_filenames_flatten_pathnames() {
        assert_eq!(page_filename_for_path("/"), "index.html");
        assert_eq!(page_filename_for_path(""), "index.html");
        assert_eq!(page_filename_for_path("/about"), "_about.html");
        assert_eq!(page_filename_for_path("/about/team"), "_about_team.html");
        assert_eq!(page_filename_for_path("/docs/guide.html"), "_docs_guide.html");
    }
}
