//! CSS reference rewriting
//!
//! Covers `url(...)` references and `@import` statements (both the
//! `@import url(...)` and bare `@import "..."` forms). Rewritten paths are
//! emitted relative to the stylesheet's own location so imports keep
//! working when the sheet moves.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    // url( 'x' ) with any quoting; group 2 is the reference.
    static ref CSS_URL_RE: Regex = Regex::new(r#"url\(\s*(['"]?)([^'")]+)\1\s*\)"#)
        .expect("BUG: hardcoded css url() regex is invalid");

    // @import "x" / @import 'x' (the url() form is caught by CSS_URL_RE).
    static ref CSS_IMPORT_RE: Regex = Regex::new(r#"@import\s+(['"])([^'"]+)\1"#)
        .expect("BUG: hardcoded @import regex is invalid");
}

/// Extract every `url(...)` and `@import` reference from a stylesheet.
///
/// Data URIs and fragment-only references are skipped. Returned values are
/// as written, not resolved.
#[must_use]
pub fn extract_css_refs(css: &str) -> Vec<String> {
    let mut refs = Vec::new();

    for captures in CSS_URL_RE.captures_iter(css) {
        if let Some(reference) = captures.get(2) {
            let reference = reference.as_str().trim();
            if is_rewritable_ref(reference) {
                refs.push(reference.to_string());
            }
        }
    }
    for captures in CSS_IMPORT_RE.captures_iter(css) {
        if let Some(reference) = captures.get(2) {
            let reference = reference.as_str().trim();
            if is_rewritable_ref(reference) {
                refs.push(reference.to_string());
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    refs.retain(|r| seen.insert(r.clone()));
    refs
}

fn is_rewritable_ref(reference: &str) -> bool {
    !reference.is_empty()
        && !reference.starts_with("data:")
        && !reference.starts_with('#')
        && !reference.starts_with("blob:")
}

/// Rewrite every reference in a stylesheet through `lookup`.
///
/// `lookup` receives the reference as written and returns the replacement
/// path (already relative to the stylesheet) or None to leave it alone.
/// Failures are per-reference: an unresolvable reference survives
/// unchanged, so rewriting is idempotent.
#[must_use]
pub fn rewrite_css_refs<F>(css: &str, lookup: F) -> (String, usize)
where
    F: Fn(&str) -> Option<String>,
{
    let mut count = 0usize;

    let rewritten = CSS_URL_RE.replace_all(css, |caps: &regex::Captures<'_>| {
        let quote = caps.get(1).map_or("", |m| m.as_str());
        let reference = caps.get(2).map_or("", |m| m.as_str()).trim();
        match lookup(reference) {
            Some(replacement) if is_rewritable_ref(reference) => {
                count += 1;
                format!("url({quote}{replacement}{quote})")
            }
            _ => caps.get(0).map_or(String::new(), |m| m.as_str().to_string()),
        }
    });

    let rewritten = CSS_IMPORT_RE.replace_all(&rewritten, |caps: &regex::Captures<'_>| {
        let quote = caps.get(1).map_or("\"", |m| m.as_str());
        let reference = caps.get(2).map_or("", |m| m.as_str()).trim();
        match lookup(reference) {
            Some(replacement) if is_rewritable_ref(reference) => {
                count += 1;
                format!("@import {quote}{replacement}{quote}")
            }
            _ => caps.get(0).map_or(String::new(), |m| m.as_str().to_string()),
        }
    });

    (rewritten.to_string(), count)
}

/// Relative path from one mirror file to another.
///
/// Both paths are relative to the output root; the result is usable as-is
/// inside the referencing file.
#[must_use]
pub fn relative_between(from_file: &Path, to_file: &Path) -> Option<String> {
    let from_dir = from_file.parent()?;
    pathdiff::diff_paths(to_file, from_dir).map(|p| p.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extracts_url_and_import_forms() {
        let css = r#"
            @import url(./fonts.css);
            @import "theme.css";
            body { background: url('../img/bg.png'); }
            .icon { background-image: url(data:image/png;base64,AAAA); }
        "#;
        let refs = extract_css_refs(css);
        assert_eq!(refs, vec!["./fonts.css", "../img/bg.png", "theme.css"]);
    }

    #[test]
    fn rewrite_preserves_quoting_and_unresolved_refs() {
        let css = r#"a { background: url("/img/a.png"); } b { background: url(/img/missing.png); }"#;
        let (out, count) = rewrite_css_refs(css, |r| {
            (r == "/img/a.png").then(|| "../img/a.png".to_string())
        });
        assert_eq!(count, 1);
        assert!(out.contains(r#"url("../img/a.png")"#));
        assert!(out.contains("url(/img/missing.png)"));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let css = r"@import url(./fonts.css); body { background: url(../img/bg.png); }";
        let lookup = |r: &str| match r {
            "./fonts.css" => Some("fonts.css".to_string()),
            "../img/bg.png" => Some("../img/bg.png".to_string()),
            _ => None,
        };
        let (once, _) = rewrite_css_refs(css, lookup);
        let (twice, _) = rewrite_css_refs(&once, lookup);
        assert_eq!(once, twice);
    }

    #[test]
    fn relative_between_files() {
        assert_eq!(
            relative_between(&PathBuf::from("css/app.css"), &PathBuf::from("img/bg.png")),
            Some("../img/bg.png".to_string())
        );
        assert_eq!(
            relative_between(&PathBuf::from("css/app.css"), &PathBuf::from("css/fonts.css")),
            Some("fonts.css".to_string())
        );
    }
}
