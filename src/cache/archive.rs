//! Cache archive export and import
//!
//! The archive is a gzipped JSON document: one record per entry carrying
//! url, contributing headers, metadata and base64 payload. Export → clear →
//! import restores the entry set by key, content- and metadata-equal.

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use super::store::CacheStore;
use crate::error::{CloneError, CloneResult};
use crate::utils::fs::atomic_write;

/// One archived cache entry
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveRecord {
    url: String,
    headers: BTreeMap<String, String>,
    content_type: Option<String>,
    ttl_secs: u64,
    stored_at: chrono::DateTime<chrono::Utc>,
    user_metadata: BTreeMap<String, String>,
    /// Base64 of the uncompressed payload
    content: String,
}

/// Top-level archive document
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveFile {
    version: u32,
    exported_at: chrono::DateTime<chrono::Utc>,
    records: Vec<ArchiveRecord>,
}

const ARCHIVE_VERSION: u32 = 1;

/// Serialize every cache entry into a single archive file.
///
/// Entries whose blobs fail integrity verification are skipped with a
/// warning rather than aborting the export.
pub async fn export_archive(store: &CacheStore, archive_path: &Path) -> CloneResult<usize> {
    let entries = store.entries_snapshot().await;
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        match store.read_blob(&entry).await {
            Ok(bytes) => {
                records.push(ArchiveRecord {
                    url: entry.url,
                    headers: entry.headers,
                    content_type: entry.content_type,
                    ttl_secs: entry.ttl_secs,
                    stored_at: entry.stored_at,
                    user_metadata: entry.user_metadata,
                    content: base64::engine::general_purpose::STANDARD.encode(&bytes),
                });
            }
            Err(e) => {
                log::warn!("Skipping unreadable cache entry {} in export: {e}", entry.key);
            }
        }
    }

    let count = records.len();
    let file = ArchiveFile {
        version: ARCHIVE_VERSION,
        exported_at: chrono::Utc::now(),
        records,
    };

    let json = serde_json::to_vec(&file).map_err(|e| CloneError::Io(e.to_string()))?;
    let compressed = tokio::task::spawn_blocking(move || -> CloneResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
        encoder
            .write_all(&json)
            .and_then(|()| encoder.finish())
            .map_err(|e| CloneError::Io(e.to_string()))
    })
    .await
    .map_err(|e| CloneError::Io(e.to_string()))??;

    atomic_write(archive_path, compressed)
        .await
        .map_err(|e| CloneError::Io(e.to_string()))?;
    log::info!("Exported {count} cache entries to {}", archive_path.display());
    Ok(count)
}

/// Import entries from an archive file into the store.
///
/// Existing entries with the same key are overwritten. Returns the number
/// of entries restored.
pub async fn import_archive(store: &CacheStore, archive_path: &Path) -> CloneResult<usize> {
    let compressed = tokio::fs::read(archive_path)
        .await
        .map_err(|_| CloneError::FileMissing(archive_path.display().to_string()))?;

    let json = tokio::task::spawn_blocking(move || -> CloneResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CloneError::CacheCorrupt(format!("archive gzip: {e}")))?;
        Ok(out)
    })
    .await
    .map_err(|e| CloneError::Io(e.to_string()))??;

    let file: ArchiveFile = serde_json::from_slice(&json)
        .map_err(|e| CloneError::CacheCorrupt(format!("archive json: {e}")))?;

    if file.version != ARCHIVE_VERSION {
        return Err(CloneError::CacheCorrupt(format!(
            "unsupported archive version {}",
            file.version
        )));
    }

    let mut restored = 0usize;
    for record in file.records {
        let bytes = match base64::engine::general_purpose::STANDARD.decode(&record.content) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Skipping archive record {} with bad base64: {e}", record.url);
                continue;
            }
        };

        let entry = super::entry::CacheEntry {
            key: super::entry::cache_key(&record.url, &record.headers),
            url: record.url,
            headers: record.headers,
            stored_at: record.stored_at,
            last_accessed: chrono::Utc::now(),
            size: bytes.len() as u64,
            stored_size: 0, // Recomputed by restore_entry
            content_type: record.content_type,
            compressed: false, // Recomputed by restore_entry
            checksum: String::new(), // Recomputed by restore_entry
            ttl_secs: record.ttl_secs,
            user_metadata: record.user_metadata,
        };

        store.restore_entry(entry, bytes).await?;
        restored += 1;
    }

    log::info!("Imported {restored} cache entries from {}", archive_path.display());
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{CacheConfig, SetOptions};

    #[tokio::test]
    async fn export_clear_import_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CacheConfig {
            root: dir.path().join(".cache"),
            max_size: 10 * 1024 * 1024,
            default_ttl_secs: 3600,
            retention_secs: 86_400,
        };
        let store = CacheStore::open(config).await.expect("open");

        let headers = BTreeMap::new();
        let mut meta = BTreeMap::new();
        meta.insert("origin".to_string(), "test".to_string());

        store
            .set(
                "https://x/a.css",
                b"body{}",
                &headers,
                SetOptions {
                    content_type: Some("text/css".to_string()),
                    metadata: meta.clone(),
                    ..Default::default()
                },
            )
            .await
            .expect("set a");
        store
            .set("https://x/b.js", &vec![42u8; 2048], &headers, SetOptions::default())
            .await
            .expect("set b");

        let archive = dir.path().join("cache-export.json.gz");
        let exported = export_archive(&store, &archive).await.expect("export");
        assert_eq!(exported, 2);

        store.clear().await.expect("clear");
        assert_eq!(store.len().await, 0);

        let imported = import_archive(&store, &archive).await.expect("import");
        assert_eq!(imported, 2);

        let a = store.get("https://x/a.css", &headers).await.expect("a restored");
        assert_eq!(a.bytes, b"body{}");
        assert_eq!(a.content_type.as_deref(), Some("text/css"));
        assert_eq!(a.metadata.get("origin").map(String::as_str), Some("test"));

        let b = store.get("https://x/b.js", &headers).await.expect("b restored");
        assert_eq!(b.bytes, vec![42u8; 2048]);
    }
}
