//! Page content analysis
//!
//! Produces the signals the strategy scorer branches on: JavaScript
//! complexity, framework presence, dynamic-content indicators and rough
//! asset counts, all computed from the raw HTML without executing it.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref MODULE_IMPORT_RE: Regex =
        Regex::new(r#"(?:import\s+[\w{}\s,*]+\s+from|require\s*\()"#)
            .expect("BUG: hardcoded import regex is invalid");
    static ref DECLARATION_RE: Regex = Regex::new(r"\b(?:class|function)\s+\w+")
        .expect("BUG: hardcoded declaration regex is invalid");
    static ref ASYNC_RE: Regex =
        Regex::new(r"\basync\b|\bawait\b").expect("BUG: hardcoded async regex is invalid");
    static ref XHR_RE: Regex = Regex::new(r"\bfetch\s*\(|XMLHttpRequest")
        .expect("BUG: hardcoded xhr regex is invalid");
    static ref LISTENER_RE: Regex = Regex::new(r"addEventListener\s*\(")
        .expect("BUG: hardcoded listener regex is invalid");
    static ref LAZY_CLASS_RE: Regex = Regex::new(r#"class\s*=\s*["'][^"']*\blazy(?:load)?\b"#)
        .expect("BUG: hardcoded lazy class regex is invalid");
    static ref ASSET_REF_RE: Regex = Regex::new(
        r#"(?:src|href)\s*=\s*["'][^"']+\.(?:css|js|png|jpe?g|gif|webp|svg|woff2?|mp4|mp3)"#
    )
    .expect("BUG: hardcoded asset ref regex is invalid");
    static ref INTERACTIVE_RE: Regex =
        Regex::new(r"<(?:button|input|select|textarea|form)\b")
            .expect("BUG: hardcoded interactive regex is invalid");
}

/// Frameworks the analyzer recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framework {
    React,
    Vue,
    Angular,
}

/// Detected framework with a confidence in [0,1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkDetection {
    pub framework: Framework,
    pub confidence: f64,
}

/// The analyzer's full signal set for one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub html_size: usize,
    /// Normalized JavaScript complexity in [0,1]
    pub js_complexity: f64,
    pub frameworks: Vec<FrameworkDetection>,
    /// Normalized dynamic-content signal score in [0,1]
    pub dynamic_signals: f64,
    pub estimated_asset_count: usize,
    pub has_spa_indicators: bool,
    pub interactive_elements: usize,
}

impl ContentAnalysis {
    /// Strongest framework confidence, 0.0 when none detected
    #[must_use]
    pub fn max_framework_confidence(&self) -> f64 {
        self.frameworks
            .iter()
            .map(|f| f.confidence)
            .fold(0.0, f64::max)
    }
}

/// Analyze raw page markup.
#[must_use]
pub fn analyze_content(html: &str) -> ContentAnalysis {
    let html_size = html.len();

    // JS complexity from counts of structural constructs, normalized so a
    // page with ~40 combined hits saturates at 1.0.
    let js_hits = MODULE_IMPORT_RE.find_iter(html).count() * 2
        + DECLARATION_RE.find_iter(html).count()
        + ASYNC_RE.find_iter(html).count()
        + XHR_RE.find_iter(html).count() * 2
        + LISTENER_RE.find_iter(html).count();
    let js_complexity = (js_hits as f64 / 40.0).min(1.0);

    let frameworks = detect_frameworks(html);

    // Dynamic signals: lazy attributes and classes, async/defer scripts.
    let data_src = html.matches("data-src").count() + html.matches("data-lazy").count();
    let lazy_classes = LAZY_CLASS_RE.find_iter(html).count();
    let deferred = html.matches("async").count().min(10) + html.matches("defer").count().min(10);
    let dynamic_signals =
        ((data_src * 2 + lazy_classes * 2 + deferred) as f64 / 30.0).min(1.0);

    let estimated_asset_count = ASSET_REF_RE.find_iter(html).count();
    let interactive_elements = INTERACTIVE_RE.find_iter(html).count();

    let has_spa_indicators = frameworks.iter().any(|f| f.confidence >= 0.5)
        || html.contains("__NEXT_DATA__")
        || html.contains("window.history.pushState")
        // A markup shell with a single mount div and little body text.
        || (html_size < 5_000 && (html.contains("id=\"app\"") || html.contains("id=\"root\"")));

    ContentAnalysis {
        html_size,
        js_complexity,
        frameworks,
        dynamic_signals,
        estimated_asset_count,
        has_spa_indicators,
        interactive_elements,
    }
}

fn detect_frameworks(html: &str) -> Vec<FrameworkDetection> {
    let mut detections = Vec::new();

    let react = [
        ("data-reactroot", 0.9),
        ("__NEXT_DATA__", 0.9),
        ("react-dom", 0.7),
        ("id=\"root\"", 0.5),
    ];
    if let Some(confidence) = best_match(html, &react) {
        detections.push(FrameworkDetection {
            framework: Framework::React,
            confidence,
        });
    }

    let vue = [
        ("data-v-", 0.9),
        ("__vue__", 0.9),
        ("vue.runtime", 0.8),
        ("id=\"app\"", 0.5),
    ];
    if let Some(confidence) = best_match(html, &vue) {
        detections.push(FrameworkDetection {
            framework: Framework::Vue,
            confidence,
        });
    }

    let angular = [("ng-version", 0.95), ("<app-root", 0.9), ("zone.js", 0.7)];
    if let Some(confidence) = best_match(html, &angular) {
        detections.push(FrameworkDetection {
            framework: Framework::Angular,
            confidence,
        });
    }

    detections
}

fn best_match(html: &str, markers: &[(&str, f64)]) -> Option<f64> {
    markers
        .iter()
        .filter(|(marker, _)| html.contains(marker))
        .map(|(_, confidence)| *confidence)
        .fold(None, |best, c| Some(best.map_or(c, |b: f64| b.max(c))))
}
