//! Session output artifacts
//!
//! After rewriting, the session directory gains an `asset-manifest.json`
//! describing everything mirrored, a `build-tool-info.json` with the
//! detection verdict, a minimal service worker listing cacheable URLs,
//! and the path-alias symlinks the chosen layout wants.

use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::assets::{AssetTable, DownloadStatus};
use crate::build_tool::{BuildToolFingerprint, PathStrategy};
use crate::error::{CloneError, CloneResult};
use crate::utils::fs::{atomic_write, symlink_or_copy_dir};

/// One row of `asset-manifest.json`
#[derive(Debug, Serialize)]
struct ManifestEntry {
    url: String,
    #[serde(rename = "type")]
    asset_type: String,
    size: Option<u64>,
    downloaded: bool,
    local_path: Option<String>,
    metadata: ManifestMetadata,
}

#[derive(Debug, Serialize)]
struct ManifestMetadata {
    discovery_method: String,
    critical: bool,
    content_type: Option<String>,
    checksum: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssetManifest {
    total: usize,
    by_type: HashMap<String, usize>,
    assets: Vec<ManifestEntry>,
}

/// Write `asset-manifest.json` for the session.
pub async fn write_asset_manifest(table: &AssetTable, output_dir: &Path) -> CloneResult<()> {
    let counts = table.counts();
    let assets = table
        .snapshot()
        .into_iter()
        .map(|a| ManifestEntry {
            url: a.url,
            asset_type: a.asset_type.to_string(),
            size: a.actual_size.or(a.expected_size),
            downloaded: a.status == DownloadStatus::Downloaded,
            local_path: a.local_path,
            metadata: ManifestMetadata {
                discovery_method: serde_json::to_value(a.discovery_method)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                critical: a.critical,
                content_type: a.content_type,
                checksum: a.checksum,
            },
        })
        .collect();

    let manifest = AssetManifest {
        total: counts.total,
        by_type: counts.by_type,
        assets,
    };
    let json =
        serde_json::to_vec_pretty(&manifest).map_err(|e| CloneError::Io(e.to_string()))?;
    atomic_write(&output_dir.join("asset-manifest.json"), json)
        .await
        .map_err(|e| CloneError::Io(e.to_string()))
}

/// Write `build-tool-info.json` with the detection verdict.
pub async fn write_build_tool_info(
    fingerprint: &BuildToolFingerprint,
    output_dir: &Path,
) -> CloneResult<()> {
    let json = serde_json::to_vec_pretty(fingerprint).map_err(|e| CloneError::Io(e.to_string()))?;
    atomic_write(&output_dir.join("build-tool-info.json"), json)
        .await
        .map_err(|e| CloneError::Io(e.to_string()))
}

/// Write a minimal service worker that pre-caches every mirrored URL.
pub async fn write_service_worker(table: &AssetTable, output_dir: &Path) -> CloneResult<()> {
    let mut paths: Vec<String> = table
        .snapshot()
        .into_iter()
        .filter(|a| a.status == DownloadStatus::Downloaded)
        .filter_map(|a| a.local_path)
        .map(|p| format!("./{p}"))
        .collect();
    paths.sort();

    let urls_json =
        serde_json::to_string_pretty(&paths).map_err(|e| CloneError::Io(e.to_string()))?;
    let sw = format!(
        r#"const CACHE_NAME = 'sitemirror-v1';
const CACHEABLE_URLS = {urls_json};

self.addEventListener('install', (event) => {{
  event.waitUntil(
    caches.open(CACHE_NAME).then((cache) => cache.addAll(CACHEABLE_URLS))
  );
}});

self.addEventListener('fetch', (event) => {{
  event.respondWith(
    caches.match(event.request).then((hit) => hit || fetch(event.request))
  );
}});
"#
    );

    atomic_write(&output_dir.join("sw.js"), sw.into_bytes())
        .await
        .map_err(|e| CloneError::Io(e.to_string()))
}

/// Create the directory aliases the path strategy wants
/// (e.g. `assets/image -> img`). Returns the number of aliases created.
pub async fn create_path_aliases(strategy: PathStrategy, output_dir: &Path) -> usize {
    let mut created = 0;
    for (alias, target) in strategy.alias_dirs() {
        let target_path = output_dir.join(&target);
        if !target_path.exists() {
            continue;
        }
        match symlink_or_copy_dir(&target_path, &output_dir.join(&alias)).await {
            Ok(symlinked) => {
                debug!("Alias {alias} -> {target} ({})", if symlinked { "symlink" } else { "copy" });
                created += 1;
            }
            Err(e) => warn!("Failed to create alias {alias}: {e}"),
        }
    }
    created
}
