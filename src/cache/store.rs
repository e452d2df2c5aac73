//! Content-addressed persistent cache
//!
//! Layout under the cache root: `cache.index` mirrors the in-memory entry
//! map, `cache.manifest` summarizes totals, and each entry stores a
//! `<key>.data` blob (optionally gzipped) beside a `<key>.meta` JSON file.
//! Index writes are atomic (temp + rename) and serialized behind a single
//! writer; a crash mid-write leaves the previous index intact.

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::entry::{cache_key, payload_checksum, CacheEntry};
use crate::error::{CloneError, CloneResult};
use crate::utils::constants::{CACHE_RETENTION_SECS, DEFAULT_CACHE_TTL_SECS, DEFAULT_MAX_CACHE_SIZE};
use crate::utils::fs::atomic_write;

/// Payloads below this size are stored uncompressed; gzip overhead would
/// exceed the savings.
const COMPRESSION_FLOOR_BYTES: usize = 1024;

/// A successful cache read
#[derive(Debug, Clone)]
pub struct CachedItem {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub stored_at: chrono::DateTime<Utc>,
}

/// Options for one `set` call
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL override in seconds; the store default applies when None
    pub ttl_secs: Option<u64>,
    /// Caller metadata persisted with the entry
    pub metadata: BTreeMap<String, String>,
    /// Content-Type of the payload
    pub content_type: Option<String>,
}

/// Store-wide configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub max_size: u64,
    pub default_ttl_secs: u64,
    pub retention_secs: u64,
}

impl CacheConfig {
    /// Config rooted at `<root>/.cache` with spec defaults
    #[must_use]
    pub fn at_root(output_root: &Path) -> Self {
        Self {
            root: output_root.join(".cache"),
            max_size: DEFAULT_MAX_CACHE_SIZE,
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            retention_secs: CACHE_RETENTION_SECS,
        }
    }
}

/// Serialized form of the index file
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    entries: HashMap<String, CacheEntry>,
}

/// Summary written to `cache.manifest` after each index flush
#[derive(Debug, Serialize)]
struct CacheManifest {
    entry_count: usize,
    total_bytes: u64,
    updated_at: chrono::DateTime<Utc>,
}

/// Process-wide content cache, shared across sessions
pub struct CacheStore {
    config: CacheConfig,
    index: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    /// Open (or create) a cache at the configured root.
    ///
    /// Loads the persisted index and runs expiration maintenance: entries
    /// past their TTL or the global retention window are removed, as are
    /// index rows whose blob files have vanished.
    pub async fn open(config: CacheConfig) -> CloneResult<Self> {
        tokio::fs::create_dir_all(&config.root)
            .await
            .map_err(CloneError::from)?;

        let index_path = config.root.join("cache.index");
        let mut entries = match tokio::fs::read(&index_path).await {
            Ok(bytes) => serde_json::from_slice::<IndexFile>(&bytes)
                .map(|f| f.entries)
                .unwrap_or_else(|e| {
                    log::warn!("Cache index unreadable, starting empty: {e}");
                    HashMap::new()
                }),
            Err(_) => HashMap::new(),
        };

        // Initialization maintenance: drop expired and orphaned rows.
        let now = Utc::now();
        let mut removed = Vec::new();
        for (key, entry) in &entries {
            let expired = entry.is_expired(now)
                || entry.is_beyond_retention(now, config.retention_secs);
            let blob_missing = !config.root.join(format!("{key}.data")).exists();
            if expired || blob_missing {
                removed.push(key.clone());
            }
        }
        for key in &removed {
            entries.remove(key);
            let _ = tokio::fs::remove_file(config.root.join(format!("{key}.data"))).await;
            let _ = tokio::fs::remove_file(config.root.join(format!("{key}.meta"))).await;
        }
        if !removed.is_empty() {
            log::info!("Cache maintenance removed {} expired entries", removed.len());
        }

        let store = Self {
            config,
            index: Mutex::new(entries),
        };
        store.flush_index().await?;
        Ok(store)
    }

    /// Total uncompressed bytes accounted in the index
    pub async fn total_size(&self) -> u64 {
        let index = self.index.lock().await;
        index.values().map(|e| e.size).sum()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.index.lock().await.is_empty()
    }

    /// Look up a URL (with its contributing request headers).
    ///
    /// Verifies the blob checksum after decompression; a mismatch removes
    /// the entry and reports a miss. Expired entries are removed on sight.
    pub async fn get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Option<CachedItem> {
        let key = cache_key(url, headers);

        let entry = {
            let mut index = self.index.lock().await;
            let entry = index.get_mut(&key)?;
            if entry.is_expired(Utc::now()) {
                index.remove(&key);
                drop(index);
                self.remove_files(&key).await;
                return None;
            }
            entry.last_accessed = Utc::now();
            entry.clone()
        };

        match self.read_blob(&entry).await {
            Ok(bytes) => Some(CachedItem {
                bytes,
                content_type: entry.content_type.clone(),
                metadata: entry.user_metadata.clone(),
                stored_at: entry.stored_at,
            }),
            Err(e) => {
                log::warn!("Cache integrity failure for {url}: {e}");
                self.index.lock().await.remove(&key);
                self.remove_files(&key).await;
                None
            }
        }
    }

    /// Store a payload for a URL.
    ///
    /// Evicts oldest-accessed entries synchronously when the new payload
    /// would push the cache past its size budget; surfaces `CacheFull` if
    /// eviction cannot free enough space.
    pub async fn set(
        &self,
        url: &str,
        bytes: &[u8],
        headers: &BTreeMap<String, String>,
        options: SetOptions,
    ) -> CloneResult<()> {
        let key = cache_key(url, headers);
        let new_size = bytes.len() as u64;

        if new_size > self.config.max_size {
            return Err(CloneError::CacheFull {
                needed: new_size,
                available: self.config.max_size,
            });
        }

        self.evict_for(new_size, &key).await?;

        let compress = bytes.len() >= COMPRESSION_FLOOR_BYTES;
        let stored = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(3));
            encoder
                .write_all(bytes)
                .and_then(|()| encoder.finish())
                .map_err(|e| CloneError::Io(e.to_string()))?
        } else {
            bytes.to_vec()
        };

        let entry = CacheEntry {
            key: key.clone(),
            url: url.to_string(),
            headers: headers.clone(),
            stored_at: Utc::now(),
            last_accessed: Utc::now(),
            size: new_size,
            stored_size: stored.len() as u64,
            content_type: options.content_type,
            compressed: compress,
            checksum: payload_checksum(bytes),
            ttl_secs: options.ttl_secs.unwrap_or(self.config.default_ttl_secs),
            user_metadata: options.metadata,
        };

        let data_path = self.config.root.join(format!("{key}.data"));
        let meta_path = self.config.root.join(format!("{key}.meta"));
        atomic_write(&data_path, stored)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;
        let meta_json =
            serde_json::to_vec_pretty(&entry).map_err(|e| CloneError::Io(e.to_string()))?;
        atomic_write(&meta_path, meta_json)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;

        self.index.lock().await.insert(key, entry);
        self.flush_index().await?;
        Ok(())
    }

    /// Remove every entry and its files
    pub async fn clear(&self) -> CloneResult<()> {
        let keys: Vec<String> = {
            let mut index = self.index.lock().await;
            let keys = index.keys().cloned().collect();
            index.clear();
            keys
        };
        for key in keys {
            self.remove_files(&key).await;
        }
        self.flush_index().await
    }

    /// Snapshot of all entries, used by the archive exporter
    pub(crate) async fn entries_snapshot(&self) -> Vec<CacheEntry> {
        self.index.lock().await.values().cloned().collect()
    }

    /// Read and verify the payload for one entry
    pub(crate) async fn read_blob(&self, entry: &CacheEntry) -> CloneResult<Vec<u8>> {
        let data_path = self.config.root.join(format!("{}.data", entry.key));
        let stored = tokio::fs::read(&data_path)
            .await
            .map_err(|_| CloneError::FileMissing(data_path.display().to_string()))?;

        let bytes = if entry.compressed {
            let compressed = stored;
            tokio::task::spawn_blocking(move || -> CloneResult<Vec<u8>> {
                let mut decoder = GzDecoder::new(compressed.as_slice());
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| CloneError::CacheCorrupt(format!("gzip: {e}")))?;
                Ok(out)
            })
            .await
            .map_err(|e| CloneError::Io(e.to_string()))??
        } else {
            stored
        };

        if payload_checksum(&bytes) != entry.checksum {
            return Err(CloneError::CacheCorrupt(format!(
                "checksum mismatch for {}",
                entry.url
            )));
        }
        Ok(bytes)
    }

    /// Re-insert an entry during archive import
    pub(crate) async fn restore_entry(
        &self,
        mut entry: CacheEntry,
        bytes: Vec<u8>,
    ) -> CloneResult<()> {
        let compress = bytes.len() >= COMPRESSION_FLOOR_BYTES;
        let stored = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(3));
            encoder
                .write_all(&bytes)
                .and_then(|()| encoder.finish())
                .map_err(|e| CloneError::Io(e.to_string()))?
        } else {
            bytes.clone()
        };
        entry.compressed = compress;
        entry.stored_size = stored.len() as u64;
        entry.checksum = payload_checksum(&bytes);
        entry.size = bytes.len() as u64;

        let data_path = self.config.root.join(format!("{}.data", entry.key));
        let meta_path = self.config.root.join(format!("{}.meta", entry.key));
        atomic_write(&data_path, stored)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;
        let meta_json =
            serde_json::to_vec_pretty(&entry).map_err(|e| CloneError::Io(e.to_string()))?;
        atomic_write(&meta_path, meta_json)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;

        self.index.lock().await.insert(entry.key.clone(), entry);
        self.flush_index().await
    }

    /// Evict oldest-accessed entries until `incoming` bytes fit.
    ///
    /// Eviction runs only when `total + incoming > max_size`; the entry
    /// being replaced does not count against the budget.
    async fn evict_for(&self, incoming: u64, replacing_key: &str) -> CloneResult<()> {
        let mut evicted = Vec::new();
        {
            let mut index = self.index.lock().await;
            let mut total: u64 = index
                .iter()
                .filter(|(k, _)| k.as_str() != replacing_key)
                .map(|(_, e)| e.size)
                .sum();

            if total + incoming <= self.config.max_size {
                return Ok(());
            }

            let mut by_access: Vec<(String, chrono::DateTime<Utc>, u64)> = index
                .iter()
                .filter(|(k, _)| k.as_str() != replacing_key)
                .map(|(k, e)| (k.clone(), e.last_accessed, e.size))
                .collect();
            by_access.sort_by_key(|(_, accessed, _)| *accessed);

            for (key, _, size) in by_access {
                if total + incoming <= self.config.max_size {
                    break;
                }
                index.remove(&key);
                total -= size;
                evicted.push(key);
            }

            if total + incoming > self.config.max_size {
                return Err(CloneError::CacheFull {
                    needed: incoming,
                    available: self.config.max_size.saturating_sub(total),
                });
            }
        }

        if !evicted.is_empty() {
            log::debug!("Cache evicted {} entries for {incoming} new bytes", evicted.len());
            for key in &evicted {
                self.remove_files(key).await;
            }
        }
        Ok(())
    }

    async fn remove_files(&self, key: &str) {
        let _ = tokio::fs::remove_file(self.config.root.join(format!("{key}.data"))).await;
        let _ = tokio::fs::remove_file(self.config.root.join(format!("{key}.meta"))).await;
    }

    /// Persist the index and manifest atomically
    async fn flush_index(&self) -> CloneResult<()> {
        let (file, manifest) = {
            let index = self.index.lock().await;
            let file = IndexFile {
                entries: index.clone(),
            };
            let manifest = CacheManifest {
                entry_count: index.len(),
                total_bytes: index.values().map(|e| e.size).sum(),
                updated_at: Utc::now(),
            };
            (file, manifest)
        };

        let index_json =
            serde_json::to_vec_pretty(&file).map_err(|e| CloneError::Io(e.to_string()))?;
        atomic_write(&self.config.root.join("cache.index"), index_json)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;

        let manifest_json =
            serde_json::to_vec_pretty(&manifest).map_err(|e| CloneError::Io(e.to_string()))?;
        atomic_write(&self.config.root.join("cache.manifest"), manifest_json)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(max_size: u64) -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CacheConfig {
            root: dir.path().join(".cache"),
            max_size,
            default_ttl_secs: 3600,
            retention_secs: 86_400,
        };
        let store = CacheStore::open(config).await.expect("open cache");
        (dir, store)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (_dir, store) = store_with(10 * 1024 * 1024).await;
        let headers = BTreeMap::new();
        let body = b"body { color: red }".to_vec();

        store
            .set(
                "https://x/y.css",
                &body,
                &headers,
                SetOptions {
                    content_type: Some("text/css".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("set");

        let item = store.get("https://x/y.css", &headers).await.expect("hit");
        assert_eq!(item.bytes, body);
        assert_eq!(item.content_type.as_deref(), Some("text/css"));
    }

    #[tokio::test]
    async fn corruption_returns_miss_and_removes_entry() {
        let (dir, store) = store_with(10 * 1024 * 1024).await;
        let headers = BTreeMap::new();
        let body = vec![7u8; 4096];

        store
            .set("https://x/y.css", &body, &headers, SetOptions::default())
            .await
            .expect("set");

        // Corrupt the data file on disk.
        let key = cache_key("https://x/y.css", &headers);
        let data_path = dir.path().join(".cache").join(format!("{key}.data"));
        tokio::fs::write(&data_path, b"garbage").await.expect("corrupt");

        assert!(store.get("https://x/y.css", &headers).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn eviction_frees_oldest_accessed() {
        let (_dir, store) = store_with(8 * 1024).await;
        let headers = BTreeMap::new();

        store
            .set("https://x/a", &vec![1u8; 3 * 1024], &headers, SetOptions::default())
            .await
            .expect("set a");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .set("https://x/b", &vec![2u8; 3 * 1024], &headers, SetOptions::default())
            .await
            .expect("set b");
        // Touch `a` so `b` is the eviction candidate.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(store.get("https://x/a", &headers).await.is_some());

        store
            .set("https://x/c", &vec![3u8; 3 * 1024], &headers, SetOptions::default())
            .await
            .expect("set c");

        assert!(store.get("https://x/b", &headers).await.is_none());
        assert!(store.get("https://x/a", &headers).await.is_some());
        assert!(store.get("https://x/c", &headers).await.is_some());
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let (_dir, store) = store_with(1024).await;
        let headers = BTreeMap::new();
        let err = store
            .set("https://x/huge", &vec![0u8; 4096], &headers, SetOptions::default())
            .await
            .expect_err("should reject");
        assert!(matches!(err, CloneError::CacheFull { .. }));
    }

    #[tokio::test]
    async fn expired_entries_are_removed_on_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CacheConfig {
            root: dir.path().join(".cache"),
            max_size: 1024 * 1024,
            default_ttl_secs: 0, // Expire immediately
            retention_secs: 86_400,
        };
        {
            let store = CacheStore::open(config.clone()).await.expect("open");
            store
                .set("https://x/a", b"abc", &BTreeMap::new(), SetOptions::default())
                .await
                .expect("set");
        }
        let reopened = CacheStore::open(config).await.expect("reopen");
        assert_eq!(reopened.len().await, 0);
    }
}
