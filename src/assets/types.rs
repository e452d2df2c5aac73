//! Core asset types
//!
//! The `Asset` is the central entity of a mirroring session: every
//! URL-addressable resource a page depends on becomes exactly one row keyed
//! by canonical URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classified asset type, driving path mapping and completeness weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetType {
    Html,
    Stylesheet,
    Javascript,
    Image,
    Font,
    Video,
    Audio,
    #[serde(rename = "3d-model")]
    ThreeDModel,
    Texture,
    EnvironmentMap,
    Manifest,
    Other,
}

impl AssetType {
    /// Weight used by the completeness verifier's quality score
    #[must_use]
    pub const fn quality_weight(self) -> u32 {
        match self {
            Self::Stylesheet => 25,
            Self::Javascript => 20,
            Self::Font => 15,
            Self::Image => 10,
            Self::ThreeDModel => 30,
            Self::Video => 15,
            Self::Audio => 10,
            Self::Html | Self::Texture | Self::EnvironmentMap | Self::Manifest | Self::Other => 5,
        }
    }

    /// Default file extension when none can be inferred from the URL
    #[must_use]
    pub const fn default_extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Stylesheet => "css",
            Self::Javascript => "js",
            Self::Image => "png",
            Self::Font => "woff2",
            Self::Video => "mp4",
            Self::Audio => "mp3",
            Self::ThreeDModel => "glb",
            Self::Texture => "ktx2",
            Self::EnvironmentMap => "hdr",
            Self::Manifest => "json",
            Self::Other => "bin",
        }
    }

    /// Rough size estimate in bytes when no content-length is available
    #[must_use]
    pub const fn estimated_size(self) -> u64 {
        match self {
            Self::Html => 30 * 1024,
            Self::Stylesheet => 50 * 1024,
            Self::Javascript => 150 * 1024,
            Self::Image => 120 * 1024,
            Self::Font => 60 * 1024,
            Self::Video => 5 * 1024 * 1024,
            Self::Audio => 1024 * 1024,
            Self::ThreeDModel => 2 * 1024 * 1024,
            Self::Texture => 512 * 1024,
            Self::EnvironmentMap => 1024 * 1024,
            Self::Manifest => 2 * 1024,
            Self::Other => 64 * 1024,
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Html => "html",
            Self::Stylesheet => "stylesheet",
            Self::Javascript => "javascript",
            Self::Image => "image",
            Self::Font => "font",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::ThreeDModel => "3d-model",
            Self::Texture => "texture",
            Self::EnvironmentMap => "environment-map",
            Self::Manifest => "manifest",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// Where an asset reference was first observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    /// Seen as a network response while the page executed
    NetworkResponse,
    /// Found scanning the live or parsed DOM
    DomScan,
    /// `url(...)` reference inside CSS
    CssUrl,
    /// `@import` inside CSS
    CssImport,
    /// Parsed out of a `srcset` attribute
    Srcset,
    /// Lazy-loading data attribute (`data-src` and friends)
    DataAttr,
    /// String literal inside JavaScript
    JsLiteral,
    /// Second-pass scan of downloaded CSS
    RecursiveCss,
    /// Second-pass scan of downloaded JS
    RecursiveJs,
    /// Second-pass scan of downloaded HTML
    RecursiveHtml,
    /// Found by both the static and dynamic processing paths
    Both,
}

/// Download lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Downloaded,
    Failed,
}

/// One URL-addressable resource in the mirror
///
/// Invariants: the canonical URL is unique within a session; once status
/// reaches `Downloaded` the local path, size and checksum are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Canonical URL, the table key
    pub url: String,
    /// URL exactly as it appeared in the referencing document
    pub original_url: String,
    /// Classified type
    pub asset_type: AssetType,
    /// How the reference was first observed
    pub discovery_method: DiscoveryMethod,
    /// Whether absence of this asset substantively degrades the page
    pub critical: bool,
    /// Size promised by HEAD/content-length, if any
    pub expected_size: Option<u64>,
    /// Size of the downloaded bytes
    pub actual_size: Option<u64>,
    /// Content-Type from the response
    pub content_type: Option<String>,
    /// Hex sha256 of the downloaded bytes
    pub checksum: Option<String>,
    /// Path relative to the session output root, assigned post-download
    pub local_path: Option<String>,
    /// Current lifecycle state
    pub status: DownloadStatus,
    /// Stable failure tag when status is Failed
    pub error_kind: Option<String>,
    /// Human-readable failure message when status is Failed
    pub error_message: Option<String>,
    /// When the reference was first recorded
    pub discovered_at: DateTime<Utc>,
    /// When the download committed
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl Asset {
    /// Create a pending asset for a freshly discovered reference
    #[must_use]
    pub fn new(
        canonical_url: String,
        original_url: String,
        asset_type: AssetType,
        discovery_method: DiscoveryMethod,
    ) -> Self {
        let critical = default_critical(asset_type);
        Self {
            url: canonical_url,
            original_url,
            asset_type,
            discovery_method,
            critical,
            expected_size: None,
            actual_size: None,
            content_type: None,
            checksum: None,
            local_path: None,
            status: DownloadStatus::Pending,
            error_kind: None,
            error_message: None,
            discovered_at: Utc::now(),
            downloaded_at: None,
        }
    }

    /// Whether the asset is settled (downloaded or failed)
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.status, DownloadStatus::Downloaded | DownloadStatus::Failed)
    }
}

/// Default criticality by type: stylesheets and fonts always substantively
/// affect rendering. Scripts and favicons are promoted to critical by the
/// analyzer based on page context.
#[must_use]
pub fn default_critical(asset_type: AssetType) -> bool {
    matches!(asset_type, AssetType::Stylesheet | AssetType::Font)
}

/// Classify an asset by its URL path, falling back to content-type hints.
///
/// # Arguments
/// * `url` - The asset URL (extension is examined)
/// * `content_type` - Optional Content-Type header value
#[must_use]
pub fn classify(url: &str, content_type: Option<&str>) -> AssetType {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or(ct).trim().to_lowercase();
        match ct.as_str() {
            "text/html" | "application/xhtml+xml" => return AssetType::Html,
            "text/css" => return AssetType::Stylesheet,
            "application/javascript" | "text/javascript" | "application/x-javascript" => {
                return AssetType::Javascript;
            }
            "application/manifest+json" => return AssetType::Manifest,
            "model/gltf-binary" | "model/gltf+json" => return AssetType::ThreeDModel,
            _ => {
                if ct.starts_with("image/") {
                    return AssetType::Image;
                }
                if ct.starts_with("video/") {
                    return AssetType::Video;
                }
                if ct.starts_with("audio/") {
                    return AssetType::Audio;
                }
                if ct.starts_with("font/") || ct == "application/font-woff" {
                    return AssetType::Font;
                }
            }
        }
    }

    classify_by_extension(url)
}

/// Classify by URL extension alone
#[must_use]
pub fn classify_by_extension(url: &str) -> AssetType {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_lowercase();
    let ext = path.rsplit('.').next().unwrap_or("");

    match ext {
        "html" | "htm" | "xhtml" => AssetType::Html,
        "css" => AssetType::Stylesheet,
        "js" | "mjs" | "cjs" => AssetType::Javascript,
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "avif" | "bmp" => {
            AssetType::Image
        }
        "woff" | "woff2" | "ttf" | "otf" | "eot" => AssetType::Font,
        "mp4" | "webm" | "ogv" | "mov" | "m4v" => AssetType::Video,
        "mp3" | "wav" | "ogg" | "m4a" | "flac" | "aac" => AssetType::Audio,
        "glb" | "gltf" | "obj" | "fbx" | "usdz" => AssetType::ThreeDModel,
        "ktx" | "ktx2" | "basis" | "dds" => AssetType::Texture,
        "hdr" | "exr" => AssetType::EnvironmentMap,
        "webmanifest" => AssetType::Manifest,
        _ => {
            if path.ends_with("manifest.json") {
                AssetType::Manifest
            } else {
                AssetType::Other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_extension() {
        assert_eq!(classify("https://x/app.css?v=2", None), AssetType::Stylesheet);
        assert_eq!(classify("https://x/chunk.mjs", None), AssetType::Javascript);
        assert_eq!(classify("https://x/hero.webp", None), AssetType::Image);
        assert_eq!(classify("https://x/font.woff2", None), AssetType::Font);
        assert_eq!(classify("https://x/scene.glb", None), AssetType::ThreeDModel);
        assert_eq!(classify("https://x/env.hdr", None), AssetType::EnvironmentMap);
        assert_eq!(classify("https://x/manifest.json", None), AssetType::Manifest);
        assert_eq!(classify("https://x/unknown", None), AssetType::Other);
    }

    #[test]
    fn content_type_wins_over_extension() {
        assert_eq!(
            classify("https://x/styles", Some("text/css; charset=utf-8")),
            AssetType::Stylesheet
        );
        assert_eq!(
            classify("https://x/data.bin", Some("model/gltf-binary")),
            AssetType::ThreeDModel
        );
    }

    #[test]
    fn stylesheets_and_fonts_default_critical() {
        assert!(default_critical(AssetType::Stylesheet));
        assert!(default_critical(AssetType::Font));
        assert!(!default_critical(AssetType::Image));
    }
}
