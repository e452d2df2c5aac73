//! Asset path mapping per detected build tool
//!
//! Maps each asset type to the directory layout its toolchain would have
//! produced, so the mirror looks like the site's own `dist/` output. Below
//! the confidence threshold the preserve-structure strategy mirrors the URL
//! path under the output root unchanged.

use std::path::PathBuf;

use super::detector::{BuildTool, BuildToolFingerprint};
use crate::assets::{Asset, AssetType};

/// Path mapping strategy for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStrategy {
    /// Tool-specific directory layout
    Tool(BuildTool),
    /// Mirror the URL path under the output root
    PreserveStructure,
}

impl PathStrategy {
    /// Choose the strategy for a fingerprint.
    ///
    /// Tool layouts apply only at confidence >= 0.8; anything weaker falls
    /// back to preserve-structure.
    #[must_use]
    pub fn for_fingerprint(fingerprint: &BuildToolFingerprint) -> Self {
        if fingerprint.mapping_applies() && fingerprint.tool != BuildTool::Unknown {
            Self::Tool(fingerprint.tool)
        } else {
            Self::PreserveStructure
        }
    }

    /// Compute the output-root-relative path for an asset.
    ///
    /// The filename component comes from the asset URL; directory placement
    /// follows the per-tool table. Media covers video and audio; everything
    /// without a row in the table preserves its URL structure.
    #[must_use]
    pub fn target_path(&self, asset: &Asset, filename: &str) -> PathBuf {
        match self {
            Self::PreserveStructure => preserve_structure_path(&asset.url, filename),
            Self::Tool(tool) => match tool_dir(*tool, asset.asset_type) {
                Some(dir) => PathBuf::from(dir).join(filename),
                None => preserve_structure_path(&asset.url, filename),
            },
        }
    }

    /// Directory aliases this strategy wants as symlinks
    /// (e.g. `assets/image -> img` for tool layouts that split by type).
    #[must_use]
    pub fn alias_dirs(&self) -> Vec<(String, String)> {
        match self {
            Self::Tool(BuildTool::VueCli | BuildTool::Vite) => {
                vec![("assets/image".to_string(), "img".to_string())]
            }
            _ => Vec::new(),
        }
    }
}

/// Per-tool directory table
fn tool_dir(tool: BuildTool, asset_type: AssetType) -> Option<&'static str> {
    match tool {
        BuildTool::VueCli => Some(match asset_type {
            AssetType::Image | AssetType::Texture | AssetType::EnvironmentMap => "img",
            AssetType::Stylesheet => "css",
            AssetType::Javascript => "js",
            AssetType::Font => "fonts",
            AssetType::Video | AssetType::Audio | AssetType::ThreeDModel => "media",
            AssetType::Html | AssetType::Manifest | AssetType::Other => return None,
        }),
        BuildTool::CreateReactApp => Some(match asset_type {
            AssetType::Stylesheet => "static/css",
            AssetType::Javascript => "static/js",
            AssetType::Image
            | AssetType::Font
            | AssetType::Video
            | AssetType::Audio
            | AssetType::Texture
            | AssetType::EnvironmentMap
            | AssetType::ThreeDModel => "static/media",
            AssetType::Html | AssetType::Manifest | AssetType::Other => return None,
        }),
        BuildTool::Vite => Some(match asset_type {
            AssetType::Image | AssetType::Texture | AssetType::EnvironmentMap => "img",
            AssetType::Stylesheet => "css",
            AssetType::Javascript => "js",
            AssetType::Font => "fonts",
            AssetType::Video | AssetType::Audio | AssetType::ThreeDModel => "assets",
            AssetType::Html | AssetType::Manifest | AssetType::Other => return None,
        }),
        BuildTool::Webpack => Some(match asset_type {
            AssetType::Image | AssetType::Texture | AssetType::EnvironmentMap => "images",
            AssetType::Stylesheet => "css",
            AssetType::Javascript => "js",
            AssetType::Font => "fonts",
            AssetType::Video => "dist/video",
            AssetType::Audio => "dist/audio",
            AssetType::ThreeDModel => "dist/3d-model",
            AssetType::Html | AssetType::Manifest | AssetType::Other => return None,
        }),
        BuildTool::AngularCli => Some(match asset_type {
            AssetType::Html | AssetType::Manifest | AssetType::Other => return None,
            _ => "assets",
        }),
        BuildTool::Unknown => None,
    }
}

/// URL pathname minus the leading slash, with the derived filename.
///
/// `https://x/img/a.png` with filename `a.png` maps to `img/a.png`.
fn preserve_structure_path(url: &str, filename: &str) -> PathBuf {
    let path = url::Url::parse(url)
        .map(|u| u.path().trim_start_matches('/').to_string())
        .unwrap_or_default();

    let mut dir = PathBuf::new();
    // Keep the URL's directory components, sanitized per segment; the
    // filename itself was already derived and sanitized by the caller.
    if let Some(parent) = std::path::Path::new(&path).parent() {
        for component in parent.components() {
            if let std::path::Component::Normal(seg) = component {
                let seg = seg.to_string_lossy();
                let clean = sanitize_filename::sanitize(seg.as_ref());
                if !clean.is_empty() {
                    dir.push(clean);
                }
            }
        }
    }
    dir.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{classify, DiscoveryMethod};

    fn asset(url: &str) -> Asset {
        Asset::new(
            url.to_string(),
            url.to_string(),
            classify(url, None),
            DiscoveryMethod::DomScan,
        )
    }

    #[test]
    fn vue_cli_table() {
        let s = PathStrategy::Tool(BuildTool::VueCli);
        assert_eq!(
            s.target_path(&asset("https://x/deep/a.png"), "a.png"),
            PathBuf::from("img/a.png")
        );
        assert_eq!(
            s.target_path(&asset("https://x/a.css"), "a.css"),
            PathBuf::from("css/a.css")
        );
        assert_eq!(
            s.target_path(&asset("https://x/f.woff2"), "f.woff2"),
            PathBuf::from("fonts/f.woff2")
        );
        assert_eq!(
            s.target_path(&asset("https://x/v.mp4"), "v.mp4"),
            PathBuf::from("media/v.mp4")
        );
    }

    #[test]
    fn cra_puts_everything_under_static() {
        let s = PathStrategy::Tool(BuildTool::CreateReactApp);
        assert_eq!(
            s.target_path(&asset("https://x/a.js"), "a.js"),
            PathBuf::from("static/js/a.js")
        );
        assert_eq!(
            s.target_path(&asset("https://x/a.png"), "a.png"),
            PathBuf::from("static/media/a.png")
        );
    }

    #[test]
    fn angular_uses_assets_root() {
        let s = PathStrategy::Tool(BuildTool::AngularCli);
        assert_eq!(
            s.target_path(&asset("https://x/a.css"), "a.css"),
            PathBuf::from("assets/a.css")
        );
    }

    #[test]
    fn webpack_media_splits_by_type() {
        let s = PathStrategy::Tool(BuildTool::Webpack);
        assert_eq!(
            s.target_path(&asset("https://x/v.webm"), "v.webm"),
            PathBuf::from("dist/video/v.webm")
        );
        assert_eq!(
            s.target_path(&asset("https://x/scene.glb"), "scene.glb"),
            PathBuf::from("dist/3d-model/scene.glb")
        );
    }

    #[test]
    fn preserve_structure_mirrors_url_path() {
        let s = PathStrategy::PreserveStructure;
        assert_eq!(
            s.target_path(&asset("https://x/img/sub/a.png"), "a.png"),
            PathBuf::from("img/sub/a.png")
        );
        assert_eq!(
            s.target_path(&asset("https://x/a.png"), "a.png"),
            PathBuf::from("a.png")
        );
    }

    #[test]
    fn low_confidence_falls_back_to_preserve() {
        let fp = BuildToolFingerprint {
            tool: BuildTool::Webpack,
            confidence: 0.7,
            signals: vec![],
        };
        assert_eq!(PathStrategy::for_fingerprint(&fp), PathStrategy::PreserveStructure);

        let fp = BuildToolFingerprint {
            tool: BuildTool::Vite,
            confidence: 0.95,
            signals: vec![],
        };
        assert_eq!(
            PathStrategy::for_fingerprint(&fp),
            PathStrategy::Tool(BuildTool::Vite)
        );
    }
}
