//! Asset fetch pipeline
//!
//! Composes the cache store, retry manager and HTTP transport: cache hits
//! short-circuit the network entirely; misses go through
//! `execute_with_retry` and land in both the cache and the mirror tree.
//! An asset transitions to `Downloaded` only after bytes, checksum and
//! local path have all been committed.

use dashmap::DashSet;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::filename::{derive_filename, with_collision_suffix};
use super::transport::HttpTransport;
use crate::assets::{Asset, AssetTable, AssetType};
use crate::build_tool::PathStrategy;
use crate::cache::{CacheStore, SetOptions};
use crate::error::{CloneError, CloneResult};
use crate::retry::{DomainLimiter, RetryManager};
use crate::url_resolver::extract_domain;
use crate::utils::fs::atomic_write;

/// Attempts at collision-suffixed names before the timestamp fallback
const COLLISION_ATTEMPTS: u32 = 6;

/// Simultaneous connections per origin, matching browser behavior
const MAX_PER_DOMAIN: usize = 2;

/// Configuration for one pipeline instance
pub struct FetchPipelineConfig {
    pub output_root: PathBuf,
    pub max_file_size: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
}

/// Cache- and retry-backed downloader writing the mirror tree
pub struct FetchPipeline {
    transport: HttpTransport,
    cache: Option<Arc<CacheStore>>,
    retry: Arc<RetryManager>,
    table: Arc<AssetTable>,
    strategy: RwLock<PathStrategy>,
    config: FetchPipelineConfig,
    domain_limiter: DomainLimiter,
    /// Relative paths already assigned this session, for collision checks
    claimed_paths: DashSet<String>,
}

impl FetchPipeline {
    /// Create a pipeline.
    ///
    /// # Arguments
    /// * `transport` - HTTP transport shared with the verifier
    /// * `cache` - Optional cache store; None disables caching entirely
    /// * `retry` - Retry manager (owns circuit breaker and rate limiter)
    /// * `table` - Session asset table
    /// * `config` - Output root and size limits
    #[must_use]
    pub fn new(
        transport: HttpTransport,
        cache: Option<Arc<CacheStore>>,
        retry: Arc<RetryManager>,
        table: Arc<AssetTable>,
        config: FetchPipelineConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            retry,
            table,
            strategy: RwLock::new(PathStrategy::PreserveStructure),
            config,
            domain_limiter: DomainLimiter::new(MAX_PER_DOMAIN),
            claimed_paths: DashSet::new(),
        }
    }

    /// Install the path strategy chosen after build-tool detection
    pub fn set_strategy(&self, strategy: PathStrategy) {
        if let Ok(mut guard) = self.strategy.write() {
            *guard = strategy;
        }
    }

    /// Current path strategy
    #[must_use]
    pub fn strategy(&self) -> PathStrategy {
        self.strategy
            .read()
            .map(|s| *s)
            .unwrap_or(PathStrategy::PreserveStructure)
    }

    /// The shared asset table
    #[must_use]
    pub fn table(&self) -> &Arc<AssetTable> {
        &self.table
    }

    /// Fetch one asset by canonical URL, mutating it to downloaded or
    /// failed in the table.
    ///
    /// Per-URL serialization is enforced through the table's status
    /// transition: a second concurrent call observes `Downloading` and
    /// returns the current row untouched.
    pub async fn fetch(&self, url: &str) -> CloneResult<Asset> {
        let asset = self
            .table
            .get(url)
            .ok_or_else(|| CloneError::InternalInvariant(format!("fetch of untracked URL {url}")))?;

        if asset.is_settled() {
            return Ok(asset);
        }
        if !self.table.begin_download(url) {
            return Ok(asset);
        }

        match self.download(url, &asset).await {
            Ok(settled) => Ok(settled),
            Err(err) => {
                self.table.record_failure(url, err.kind_tag(), &err.to_string());
                Err(err)
            }
        }
    }

    /// Direct fetch used by completeness recovery: bypasses the cache and
    /// the retry budget, with its own timeout.
    pub async fn fetch_direct(&self, url: &str, timeout: Duration) -> CloneResult<Asset> {
        let asset = self
            .table
            .get(url)
            .ok_or_else(|| CloneError::InternalInvariant(format!("recovery of untracked URL {url}")))?;

        let request_headers = request_headers(asset.asset_type);
        let response = self
            .transport
            .fetch(url, &request_headers, timeout)
            .await?;
        if !(200..300).contains(&response.status) {
            let err = CloneError::HttpStatus(response.status);
            self.table.record_failure(url, err.kind_tag(), &err.to_string());
            return Err(err);
        }

        self.check_size(response.bytes.len() as u64)?;
        let content_type = response.content_type().map(str::to_string);
        self.commit(url, &asset, response.bytes, content_type).await
    }

    async fn download(&self, url: &str, asset: &Asset) -> CloneResult<Asset> {
        let request_headers = request_headers(asset.asset_type);
        let cache_headers = cache_headers(&request_headers);

        // Cache first.
        if let Some(cache) = &self.cache
            && let Some(item) = cache.get(url, &cache_headers).await
        {
            debug!("Cache hit for {url}");
            self.check_size(item.bytes.len() as u64)?;
            return self.commit(url, asset, item.bytes, item.content_type).await;
        }

        let domain = extract_domain(url).map_err(CloneError::UrlMalformed)?;
        let _domain_permit = self.domain_limiter.acquire(&domain).await;
        let transport = &self.transport;
        let response = self
            .retry
            .execute_with_retry(&domain, |_attempt, timeout| {
                let headers = request_headers.clone();
                async move {
                    let response = transport.fetch(url, &headers, timeout).await?;
                    if !(200..300).contains(&response.status) {
                        return Err(CloneError::HttpStatus(response.status));
                    }
                    Ok(response)
                }
            })
            .await?;

        self.check_size(response.bytes.len() as u64)?;
        let content_type = response.content_type().map(str::to_string);

        if let Some(cache) = &self.cache {
            let options = SetOptions {
                ttl_secs: self.config.cache_ttl_secs,
                content_type: content_type.clone(),
                metadata: BTreeMap::new(),
            };
            if let Err(e) = cache.set(url, &response.bytes, &cache_headers, options).await {
                // A full cache degrades to uncached operation.
                warn!("Failed to cache {url}: {e}");
            }
        }

        self.commit(url, asset, response.bytes, content_type).await
    }

    /// Write bytes to the mirror tree and commit the asset row.
    async fn commit(
        &self,
        url: &str,
        asset: &Asset,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> CloneResult<Asset> {
        let filename = derive_filename(url, content_type.as_deref(), asset.asset_type);
        let relative = self.claim_path(asset, &filename).await;
        let absolute = self.config.output_root.join(&relative);

        let size = bytes.len() as u64;
        let checksum = hex::encode(Sha256::digest(&bytes));

        atomic_write(&absolute, bytes)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;

        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if !self
            .table
            .commit_download(url, relative_str, size, checksum, content_type)
        {
            return Err(CloneError::InternalInvariant(format!(
                "double commit for {url}"
            )));
        }

        self.table
            .get(url)
            .ok_or_else(|| CloneError::InternalInvariant(format!("asset vanished: {url}")))
    }

    /// Reserve a unique relative path, suffixing on collision.
    async fn claim_path(&self, asset: &Asset, filename: &str) -> PathBuf {
        let strategy = self.strategy();

        let mut candidate_name = filename.to_string();
        for attempt in 1..=COLLISION_ATTEMPTS {
            let relative = strategy.target_path(asset, &candidate_name);
            let key = relative.to_string_lossy().to_string();

            if self.claimed_paths.insert(key) {
                let on_disk = tokio::fs::try_exists(self.config.output_root.join(&relative))
                    .await
                    .unwrap_or(false);
                if !on_disk {
                    return relative;
                }
            }
            candidate_name = with_collision_suffix(filename, attempt);
        }

        // Timestamp fallback is effectively unique.
        let final_name = with_collision_suffix(filename, COLLISION_ATTEMPTS + 1);
        let relative = strategy.target_path(asset, &final_name);
        self.claimed_paths
            .insert(relative.to_string_lossy().to_string());
        relative
    }

    /// Enforce the file size ceiling: equal is accepted, larger rejected.
    fn check_size(&self, size: u64) -> CloneResult<()> {
        match self.config.max_file_size {
            Some(limit) if size > limit => Err(CloneError::FileTooLarge { size, limit }),
            _ => Ok(()),
        }
    }
}

/// Browser-like per-type Accept headers.
///
/// These also contribute to the cache key, so an image and a stylesheet
/// fetched from the same URL cache separately.
fn request_headers(asset_type: AssetType) -> HashMap<String, String> {
    let accept = match asset_type {
        AssetType::Html => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        AssetType::Stylesheet => "text/css,*/*;q=0.1",
        AssetType::Javascript => "*/*",
        AssetType::Image | AssetType::Texture => "image/avif,image/webp,image/apng,*/*;q=0.8",
        AssetType::Font => "font/woff2,font/woff,*/*;q=0.8",
        _ => "*/*",
    };
    HashMap::from([("Accept".to_string(), accept.to_string())])
}

fn cache_headers(request_headers: &HashMap<String, String>) -> BTreeMap<String, String> {
    request_headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{classify, DiscoveryMethod};
    use crate::retry::{CircuitBreaker, RateLimiter, RetryPolicy};

    fn pipeline(
        root: PathBuf,
        cache: Option<Arc<CacheStore>>,
        max_file_size: Option<u64>,
    ) -> (Arc<AssetTable>, FetchPipeline) {
        let table = Arc::new(AssetTable::new());
        let retry = Arc::new(RetryManager::new(
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                jitter: false,
                ..Default::default()
            },
            Arc::new(CircuitBreaker::new(10, Duration::from_secs(60))),
            Arc::new(RateLimiter::new(None, 8)),
        ));
        let pipeline = FetchPipeline::new(
            HttpTransport::new().expect("transport"),
            cache,
            retry,
            Arc::clone(&table),
            FetchPipelineConfig {
                output_root: root,
                max_file_size,
                cache_ttl_secs: None,
            },
        );
        (table, pipeline)
    }

    fn track(table: &AssetTable, url: &str) {
        table.insert(Asset::new(
            url.to_string(),
            url.to_string(),
            classify(url, None),
            DiscoveryMethod::DomScan,
        ));
    }

    #[tokio::test]
    async fn downloads_and_commits_with_checksum() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/app.css")
            .with_status(200)
            .with_header("content-type", "text/css")
            .with_body("body{}")
            .create_async()
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let (table, pipeline) = pipeline(dir.path().to_path_buf(), None, None);
        let url = format!("{}/app.css", server.url());
        track(&table, &url);

        let asset = pipeline.fetch(&url).await.expect("fetch");
        assert_eq!(asset.status, crate::assets::DownloadStatus::Downloaded);

        let local = asset.local_path.expect("local path");
        let on_disk = tokio::fs::read(dir.path().join(&local)).await.expect("file");
        assert_eq!(on_disk, b"body{}");

        let expected = hex::encode(Sha256::digest(b"body{}"));
        assert_eq!(asset.checksum.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn non_2xx_records_http_status_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone.js")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let (table, pipeline) = pipeline(dir.path().to_path_buf(), None, None);
        let url = format!("{}/gone.js", server.url());
        track(&table, &url);

        let err = pipeline.fetch(&url).await.expect_err("must fail");
        assert!(matches!(err, CloneError::HttpStatus(404)));

        let asset = table.get(&url).expect("asset");
        assert_eq!(asset.status, crate::assets::DownloadStatus::Failed);
        assert_eq!(asset.error_kind.as_deref(), Some("http_status"));
    }

    #[tokio::test]
    async fn size_boundary_accepts_equal_rejects_larger() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/exact.bin")
            .with_status(200)
            .with_body(vec![0u8; 100])
            .create_async()
            .await;
        server
            .mock("GET", "/over.bin")
            .with_status(200)
            .with_body(vec![0u8; 101])
            .create_async()
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let (table, pipeline) = pipeline(dir.path().to_path_buf(), None, Some(100));
        let exact = format!("{}/exact.bin", server.url());
        let over = format!("{}/over.bin", server.url());
        track(&table, &exact);
        track(&table, &over);

        assert!(pipeline.fetch(&exact).await.is_ok());
        let err = pipeline.fetch(&over).await.expect_err("over limit");
        assert!(matches!(err, CloneError::FileTooLarge { size: 101, limit: 100 }));
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Arc::new(
            CacheStore::open(crate::cache::CacheConfig::at_root(dir.path()))
                .await
                .expect("cache"),
        );

        // Unroutable URL: any network attempt would fail.
        let url = "http://127.0.0.1:1/cached.css";
        let headers = BTreeMap::from([("accept".to_string(), "text/css,*/*;q=0.1".to_string())]);
        cache
            .set(
                url,
                b".cached{}",
                &headers,
                SetOptions {
                    content_type: Some("text/css".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("seed cache");

        let (table, pipeline) = pipeline(dir.path().to_path_buf(), Some(cache), None);
        track(&table, url);

        let asset = pipeline.fetch(url).await.expect("cache-served fetch");
        assert_eq!(asset.status, crate::assets::DownloadStatus::Downloaded);
        let local = asset.local_path.expect("path");
        let bytes = tokio::fs::read(dir.path().join(local)).await.expect("file");
        assert_eq!(bytes, b".cached{}");
    }

    #[tokio::test]
    async fn colliding_filenames_get_suffixes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/a/logo.png")
            .with_status(200)
            .with_body("one")
            .create_async()
            .await;
        server
            .mock("GET", "/b/logo.png")
            .with_status(200)
            .with_body("two")
            .create_async()
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let (table, pipeline) = pipeline(dir.path().to_path_buf(), None, None);
        // Tool layout flattens into img/, forcing the name collision.
        pipeline.set_strategy(PathStrategy::Tool(crate::build_tool::BuildTool::VueCli));

        let first = format!("{}/a/logo.png", server.url());
        let second = format!("{}/b/logo.png", server.url());
        track(&table, &first);
        track(&table, &second);

        let a = pipeline.fetch(&first).await.expect("first");
        let b = pipeline.fetch(&second).await.expect("second");

        let pa = a.local_path.expect("a path");
        let pb = b.local_path.expect("b path");
        assert_ne!(pa, pb);
        assert!(pa.starts_with("img/"));
        assert!(pb.starts_with("img/"));
    }
}
