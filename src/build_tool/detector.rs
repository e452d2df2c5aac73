//! Build-tool fingerprinting
//!
//! Classifies the toolchain that produced a site from the signals visible
//! in its markup: script naming patterns, root-element selectors, meta
//! generators and dev-server artifacts. The fingerprint drives the path
//! mapping strategy used when laying assets out on disk.

use serde::{Deserialize, Serialize};

/// Known build tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildTool {
    VueCli,
    CreateReactApp,
    Vite,
    Webpack,
    AngularCli,
    Unknown,
}

impl std::fmt::Display for BuildTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::VueCli => "vue-cli",
            Self::CreateReactApp => "create-react-app",
            Self::Vite => "vite",
            Self::Webpack => "webpack",
            Self::AngularCli => "angular-cli",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Observations collected from a rendered page, input to detection
#[derive(Debug, Clone, Default)]
pub struct PageObservations {
    /// `src` values of every script tag
    pub script_srcs: Vec<String>,
    /// `href` values of every stylesheet link
    pub stylesheet_hrefs: Vec<String>,
    /// ids of candidate root mount elements (`#app`, `#root`, ...)
    pub root_element_ids: Vec<String>,
    /// Custom element tag names seen in the DOM (e.g. `app-root`)
    pub custom_tags: Vec<String>,
    /// `<meta name="generator">` content, if present
    pub meta_generator: Option<String>,
    /// Whether a Vue runtime global / data-v attribute was observed
    pub has_vue_markers: bool,
    /// Whether a React runtime marker was observed
    pub has_react_markers: bool,
}

impl PageObservations {
    /// Collect observations from raw page markup.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        let document = scraper::Html::parse_document(html);

        fn attr_values(document: &scraper::Html, selector: &str, attr: &str) -> Vec<String> {
            let Ok(selector) = scraper::Selector::parse(selector) else {
                return Vec::new();
            };
            document
                .select(&selector)
                .filter_map(|el| el.value().attr(attr))
                .map(str::to_string)
                .collect()
        }

        let custom_tags = {
            let mut tags: Vec<String> = Vec::new();
            if let Ok(selector) = scraper::Selector::parse("body *") {
                for el in document.select(&selector) {
                    let name = el.value().name();
                    if name.contains('-') && !tags.iter().any(|t| t == name) {
                        tags.push(name.to_string());
                    }
                }
            }
            tags
        };

        Self {
            script_srcs: attr_values(&document, "script[src]", "src"),
            stylesheet_hrefs: attr_values(&document, "link[rel=\"stylesheet\"]", "href"),
            root_element_ids: attr_values(&document, "div[id], main[id], section[id]", "id"),
            custom_tags,
            meta_generator: attr_values(&document, "meta[name=\"generator\"]", "content")
                .into_iter()
                .next(),
            has_vue_markers: html.contains("data-v-") || html.contains("__vue__"),
            has_react_markers: html.contains("data-reactroot") || html.contains("__NEXT_DATA__"),
        }
    }
}

/// Detection result with confidence and the signals that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildToolFingerprint {
    pub tool: BuildTool,
    /// Confidence in [0,1]; path mapping applies at >= 0.8
    pub confidence: f64,
    /// Human-readable signals supporting the classification
    pub signals: Vec<String>,
}

impl BuildToolFingerprint {
    /// Fingerprint for an unrecognized toolchain
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            tool: BuildTool::Unknown,
            confidence: 0.0,
            signals: Vec::new(),
        }
    }

    /// Whether the tool-specific path mapping applies.
    ///
    /// Below 0.8 the preserve-structure strategy is used unconditionally;
    /// the recorded signals are retained for the build-tool report either
    /// way.
    #[must_use]
    pub fn mapping_applies(&self) -> bool {
        self.confidence >= 0.8
    }
}

/// Candidate produced by one signature check
struct Candidate {
    tool: BuildTool,
    confidence: f64,
    signals: Vec<String>,
}

/// Detect the build tool from page observations.
///
/// Each signature contributes a candidate; the highest confidence wins.
/// A later detection pass with a stronger signal may override an earlier
/// fingerprint (callers keep the max-confidence result).
#[must_use]
pub fn detect(observations: &PageObservations) -> BuildToolFingerprint {
    let mut candidates: Vec<Candidate> = Vec::new();

    let script_blob = observations.script_srcs.join("\n").to_lowercase();

    // Vite leaves unmistakable dev/build artifacts.
    if script_blob.contains("/@vite/")
        || script_blob.contains(".vite/")
        || observations.script_srcs.iter().any(|s| s.contains("?v="))
    {
        candidates.push(Candidate {
            tool: BuildTool::Vite,
            confidence: 0.95,
            signals: vec!["vite client or ?v= hashed import".to_string()],
        });
    }

    // Vue presence; chunk-vendors / app.<hash>.js raises confidence.
    if observations.has_vue_markers
        || observations.root_element_ids.iter().any(|id| id == "app")
    {
        let strong = script_blob.contains("chunk-vendors")
            || observations
                .script_srcs
                .iter()
                .any(|s| is_hashed_bundle(s, "app"));
        let mut signals = vec!["vue runtime markers or #app root".to_string()];
        if strong {
            signals.push("chunk-vendors/app.* bundle naming".to_string());
        }
        candidates.push(Candidate {
            tool: BuildTool::VueCli,
            confidence: if strong { 0.9 } else { 0.8 },
            signals,
        });
    }

    // React root; static/js/ layout raises confidence.
    if observations.has_react_markers
        || observations.root_element_ids.iter().any(|id| id == "root")
    {
        let strong = script_blob.contains("static/js/")
            || observations
                .stylesheet_hrefs
                .iter()
                .any(|h| h.contains("static/css/"));
        let mut signals = vec!["react markers or #root mount".to_string()];
        if strong {
            signals.push("static/js static/css layout".to_string());
        }
        candidates.push(Candidate {
            tool: BuildTool::CreateReactApp,
            confidence: if strong { 0.9 } else { 0.8 },
            signals,
        });
    }

    // Angular root element; polyfills/main/runtime bundles raise confidence.
    if observations
        .custom_tags
        .iter()
        .any(|t| t == "app-root" || t.starts_with("app-"))
        || script_blob.contains("zone.js")
    {
        let strong = ["polyfills", "main", "runtime"]
            .iter()
            .filter(|name| {
                observations
                    .script_srcs
                    .iter()
                    .any(|s| is_hashed_bundle(s, name) || s.contains(&format!("{name}.js")))
            })
            .count()
            >= 2;
        let mut signals = vec!["angular root element or zone.js".to_string()];
        if strong {
            signals.push("polyfills/main/runtime bundle set".to_string());
        }
        candidates.push(Candidate {
            tool: BuildTool::AngularCli,
            confidence: if strong { 0.9 } else { 0.8 },
            signals,
        });
    }

    // Generic webpack naming, only meaningful without a stronger signal.
    if ["chunk", "runtime", "vendor"]
        .iter()
        .any(|p| script_blob.contains(p))
    {
        candidates.push(Candidate {
            tool: BuildTool::Webpack,
            confidence: 0.7,
            signals: vec!["chunk/runtime/vendor script naming".to_string()],
        });
    }

    // Meta generator is decisive when it names a tool outright.
    if let Some(generator) = &observations.meta_generator {
        let lower = generator.to_lowercase();
        let tool = if lower.contains("vite") {
            Some(BuildTool::Vite)
        } else if lower.contains("vue") {
            Some(BuildTool::VueCli)
        } else if lower.contains("react") {
            Some(BuildTool::CreateReactApp)
        } else if lower.contains("angular") {
            Some(BuildTool::AngularCli)
        } else {
            None
        };
        if let Some(tool) = tool {
            candidates.push(Candidate {
                tool,
                confidence: 0.9,
                signals: vec![format!("meta generator: {generator}")],
            });
        }
    }

    let best = candidates.into_iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    match best {
        Some(c) => BuildToolFingerprint {
            tool: c.tool,
            confidence: c.confidence,
            signals: c.signals,
        },
        None => BuildToolFingerprint::unknown(),
    }
}

/// Merge a new fingerprint into an existing one, keeping the stronger.
#[must_use]
pub fn merge(existing: BuildToolFingerprint, new: BuildToolFingerprint) -> BuildToolFingerprint {
    if new.confidence > existing.confidence {
        new
    } else {
        existing
    }
}

/// Matches `name.<hash>.js` bundle naming (e.g. `app.8f3a2c.js`)
fn is_hashed_bundle(src: &str, name: &str) -> bool {
    let file = src.rsplit('/').next().unwrap_or(src);
    let Some(rest) = file.strip_prefix(name) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('.') else {
        return false;
    };
    rest.ends_with(".js") && rest.len() > 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vite_artifacts_are_decisive() {
        let obs = PageObservations {
            script_srcs: vec!["/@vite/client".to_string()],
            ..Default::default()
        };
        let fp = detect(&obs);
        assert_eq!(fp.tool, BuildTool::Vite);
        assert!((fp.confidence - 0.95).abs() < f64::EPSILON);
        assert!(fp.mapping_applies());
    }

    #[test]
    fn vue_with_chunk_vendors_is_high_confidence() {
        let obs = PageObservations {
            has_vue_markers: true,
            script_srcs: vec![
                "/js/chunk-vendors.5a3f.js".to_string(),
                "/js/app.8f3a2c.js".to_string(),
            ],
            ..Default::default()
        };
        let fp = detect(&obs);
        assert_eq!(fp.tool, BuildTool::VueCli);
        assert!((fp.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn react_root_without_static_layout_is_base_confidence() {
        let obs = PageObservations {
            root_element_ids: vec!["root".to_string()],
            ..Default::default()
        };
        let fp = detect(&obs);
        assert_eq!(fp.tool, BuildTool::CreateReactApp);
        assert!((fp.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn webpack_naming_loses_to_stronger_signal() {
        let obs = PageObservations {
            root_element_ids: vec!["root".to_string()],
            script_srcs: vec!["/static/js/runtime-main.js".to_string()],
            ..Default::default()
        };
        let fp = detect(&obs);
        // CRA at 0.9 beats webpack at 0.7 despite "runtime" matching both.
        assert_eq!(fp.tool, BuildTool::CreateReactApp);
    }

    #[test]
    fn bare_webpack_naming_is_below_mapping_threshold() {
        let obs = PageObservations {
            script_srcs: vec!["/dist/vendor.bundle.js".to_string()],
            ..Default::default()
        };
        let fp = detect(&obs);
        assert_eq!(fp.tool, BuildTool::Webpack);
        assert!((fp.confidence - 0.7).abs() < f64::EPSILON);
        assert!(!fp.mapping_applies());
    }

    #[test]
    fn no_signals_yields_unknown() {
        let fp = detect(&PageObservations::default());
        assert_eq!(fp.tool, BuildTool::Unknown);
        assert!(!fp.mapping_applies());
    }

    #[test]
    fn merge_keeps_stronger_fingerprint() {
        let weak = BuildToolFingerprint {
            tool: BuildTool::Webpack,
            confidence: 0.7,
            signals: vec![],
        };
        let strong = BuildToolFingerprint {
            tool: BuildTool::Vite,
            confidence: 0.95,
            signals: vec![],
        };
        assert_eq!(merge(weak.clone(), strong.clone()).tool, BuildTool::Vite);
        assert_eq!(merge(strong, weak).tool, BuildTool::Vite);
    }
}
