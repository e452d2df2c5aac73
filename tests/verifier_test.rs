//! Completeness verification and critical-asset recovery

use std::sync::Arc;
use std::time::Duration;

use sitemirror::assets::{classify, Asset, AssetTable, DiscoveryMethod, DownloadStatus};
use sitemirror::fetch::{FetchPipeline, FetchPipelineConfig, HttpTransport};
use sitemirror::retry::{CircuitBreaker, RateLimiter, RetryManager, RetryPolicy};
use sitemirror::verifier::Verifier;

fn make_pipeline(root: &std::path::Path, table: Arc<AssetTable>) -> FetchPipeline {
    FetchPipeline::new(
        HttpTransport::new().expect("transport"),
        None,
        Arc::new(RetryManager::new(
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                jitter: false,
                ..Default::default()
            },
            Arc::new(CircuitBreaker::new(10, Duration::from_secs(60))),
            Arc::new(RateLimiter::new(None, 4)),
        )),
        table,
        FetchPipelineConfig {
            output_root: root.to_path_buf(),
            max_file_size: None,
            cache_ttl_secs: None,
        },
    )
}

fn insert(table: &AssetTable, url: &str) {
    table.insert(Asset::new(
        url.to_string(),
        url.to_string(),
        classify(url, None),
        DiscoveryMethod::DomScan,
    ));
}

#[tokio::test]
async fn failed_critical_stylesheet_is_recovered_by_direct_fetch() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/main.css")
        .with_status(200)
        .with_header("content-type", "text/css")
        .with_body("body { color: rebeccapurple }")
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let table = Arc::new(AssetTable::new());
    let url = format!("{}/main.css", server.url());

    // The crawl recorded this critical stylesheet as failed.
    insert(&table, &url);
    table.begin_download(&url);
    table.record_failure(&url, "http_status", "HTTP status 503");
    assert_eq!(table.get(&url).expect("asset").status, DownloadStatus::Failed);

    let pipeline = make_pipeline(dir.path(), Arc::clone(&table));
    let verifier = Verifier::new(Arc::clone(&table), dir.path());
    let expected = vec![url.clone()];
    let report = verifier.verify(&expected, &pipeline).await;

    assert_eq!(report.recovered, vec![url.clone()]);
    assert!(report.downloaded.contains(&url));
    assert!(report.failed.is_empty());
    assert!((report.completeness_percent - 100.0).abs() < f32::EPSILON);

    let asset = table.get(&url).expect("asset");
    assert_eq!(asset.status, DownloadStatus::Downloaded);
    let local = asset.local_path.expect("written to disk");
    assert!(dir.path().join(local).exists());
}

#[tokio::test]
async fn expected_but_never_discovered_assets_are_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = Arc::new(AssetTable::new());
    let pipeline = make_pipeline(dir.path(), Arc::clone(&table));
    let verifier = Verifier::new(Arc::clone(&table), dir.path());

    // Non-critical image on an unroutable host: missing, not recovered.
    let expected = vec!["http://127.0.0.1:1/hero.png".to_string()];
    let report = verifier.verify(&expected, &pipeline).await;

    assert_eq!(report.missing, expected);
    assert!(report.recovered.is_empty());
    assert_eq!(report.completeness_percent, 0.0);
}

#[tokio::test]
async fn recorded_download_with_missing_file_is_flagged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = Arc::new(AssetTable::new());

    let url = "https://site.test/app.js";
    insert(&table, url);
    table.begin_download(url);
    table.commit_download(url, "js/app.js".to_string(), 10, "cafe".to_string(), None);
    // File never written to disk.

    let pipeline = make_pipeline(dir.path(), Arc::clone(&table));
    let verifier = Verifier::new(Arc::clone(&table), dir.path());
    let report = verifier.verify(&[url.to_string()], &pipeline).await;

    assert_eq!(report.file_missing_on_disk, vec![url.to_string()]);
    assert!(report.downloaded.is_empty());
}

#[tokio::test]
async fn quality_score_weights_types() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/a.css")
        .with_status(200)
        .with_body(vec![b'x'; 500])
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let table = Arc::new(AssetTable::new());
    let pipeline = make_pipeline(dir.path(), Arc::clone(&table));

    let css = format!("{}/a.css", server.url());
    insert(&table, &css);
    pipeline.fetch(&css).await.expect("fetch css");

    let img = "http://127.0.0.1:1/a.png".to_string();
    insert(&table, &img);
    table.begin_download(&img);
    table.record_failure(&img, "network", "unreachable");

    let verifier = Verifier::new(Arc::clone(&table), dir.path());
    let expected = vec![css, img];
    let report = verifier.verify(&expected, &pipeline).await;

    // CSS (25) downloaded, image (10) failed: 25/35.
    let expected_quality = 25.0 / 35.0 * 100.0;
    assert!((report.quality_score - expected_quality).abs() < 0.5, "{}", report.quality_score);
    assert!((report.completeness_percent - 50.0).abs() < f32::EPSILON);
}
