//! Local filename derivation
//!
//! Filenames come from the URL path, sanitized of filesystem-reserved
//! characters. Extensionless names get an extension inferred from the
//! content type first, URL patterns second and the classified asset type
//! last. Collisions append a numeric suffix up to a small limit, then a
//! timestamp.

use crate::assets::AssetType;

/// Collision suffixes tried before falling back to a timestamp
const MAX_COLLISION_SUFFIX: u32 = 5;

/// Derive a sanitized filename for an asset URL.
///
/// # Arguments
/// * `url` - Canonical asset URL
/// * `content_type` - Response Content-Type, if known
/// * `asset_type` - Classified type, the extension fallback of last resort
#[must_use]
pub fn derive_filename(url: &str, content_type: Option<&str>, asset_type: AssetType) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let raw_name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string();

    let mut name = sanitize_filename::sanitize(&raw_name);
    if name.is_empty() || name == "." || name == ".." {
        name = "index".to_string();
    }

    if has_extension(&name) {
        return name;
    }

    let ext = extension_from_content_type(content_type)
        .or_else(|| extension_from_url_pattern(url))
        .unwrap_or_else(|| asset_type.default_extension().to_string());

    format!("{name}.{ext}")
}

/// Collision-resolved variant of a filename.
///
/// `style.css` with suffix 2 becomes `style-2.css`; past the suffix limit
/// a millisecond timestamp is appended instead.
#[must_use]
pub fn with_collision_suffix(filename: &str, attempt: u32) -> String {
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    };

    let tag = if attempt <= MAX_COLLISION_SUFFIX {
        attempt.to_string()
    } else {
        chrono::Utc::now().timestamp_millis().to_string()
    };

    match ext {
        Some(ext) => format!("{stem}-{tag}.{ext}"),
        None => format!("{stem}-{tag}"),
    }
}

fn has_extension(name: &str) -> bool {
    matches!(name.rsplit_once('.'), Some((stem, ext))
        if !stem.is_empty() && !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn extension_from_content_type(content_type: Option<&str>) -> Option<String> {
    let ct = content_type?
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let ext = match ct.as_str() {
        "text/html" | "application/xhtml+xml" => "html",
        "text/css" => "css",
        "application/javascript" | "text/javascript" => "js",
        "application/json" | "application/manifest+json" => "json",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/avif" => "avif",
        "font/woff2" => "woff2",
        "font/woff" | "application/font-woff" => "woff",
        "font/ttf" => "ttf",
        "font/otf" => "otf",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" => "wav",
        "model/gltf-binary" => "glb",
        "model/gltf+json" => "gltf",
        "text/plain" => "txt",
        _ => return None,
    };
    Some(ext.to_string())
}

/// Infer an extension from recognizable URL shapes
/// (e.g. `/api/font?family=x` or a `/css/` path segment).
fn extension_from_url_pattern(url: &str) -> Option<String> {
    let lower = url.to_lowercase();
    let ext = if lower.contains("/css/") || lower.contains("stylesheet") {
        "css"
    } else if lower.contains("/js/") || lower.contains("javascript") {
        "js"
    } else if lower.contains("/font") {
        "woff2"
    } else if lower.contains("/img/") || lower.contains("/image") {
        "png"
    } else {
        return None;
    };
    Some(ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            derive_filename("https://x/img/logo.png?v=3", None, AssetType::Image),
            "logo.png"
        );
        assert_eq!(
            derive_filename("https://x/css/app.css", None, AssetType::Stylesheet),
            "app.css"
        );
    }

    #[test]
    fn root_path_becomes_index() {
        assert_eq!(
            derive_filename("https://x/", Some("text/html"), AssetType::Html),
            "index.html"
        );
    }

    #[test]
    fn content_type_beats_url_pattern() {
        assert_eq!(
            derive_filename("https://x/css/bundle", Some("application/javascript"), AssetType::Other),
            "bundle.js"
        );
    }

    #[test]
    fn url_pattern_beats_asset_type() {
        assert_eq!(
            derive_filename("https://x/css/bundle", None, AssetType::Other),
            "bundle.css"
        );
    }

    #[test]
    fn asset_type_is_final_fallback() {
        assert_eq!(
            derive_filename("https://x/opaque", None, AssetType::Font),
            "opaque.woff2"
        );
    }

    #[test]
    fn reserved_characters_are_sanitized() {
        let name = derive_filename("https://x/a%3Cb%3E.css", None, AssetType::Stylesheet);
        assert!(!name.contains('<') && !name.contains('>'));
    }

    #[test]
    fn collision_suffixes_then_timestamp() {
        assert_eq!(with_collision_suffix("style.css", 1), "style-1.css");
        assert_eq!(with_collision_suffix("style.css", 5), "style-5.css");
        let stamped = with_collision_suffix("style.css", 6);
        assert!(stamped.starts_with("style-") && stamped.ends_with(".css"));
        assert_ne!(stamped, "style-6.css");
    }

    #[test]
    fn collision_suffix_without_extension() {
        assert_eq!(with_collision_suffix("LICENSE", 2), "LICENSE-2");
    }
}
