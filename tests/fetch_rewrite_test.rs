//! Cross-module scenarios: fetch pipeline invariants and build-tool-aware
//! rewriting of a Vue-CLI page with srcset variants.

use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sitemirror::assets::{classify, Asset, AssetTable, DiscoveryMethod, DownloadStatus};
use sitemirror::build_tool::{detect, BuildTool, PageObservations, PathStrategy};
use sitemirror::fetch::{FetchPipeline, FetchPipelineConfig, HttpTransport};
use sitemirror::retry::{CircuitBreaker, RateLimiter, RetryManager, RetryPolicy};
use sitemirror::rewriter::Rewriter;
use sitemirror::url_resolver::UrlResolver;

fn make_pipeline(root: &Path) -> (Arc<AssetTable>, Arc<FetchPipeline>) {
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
    let pipeline = Arc::new(FetchPipeline::new(
        HttpTransport::new().expect("transport"),
        None,
        retry,
        Arc::clone(&table),
        FetchPipelineConfig {
            output_root: root.to_path_buf(),
            max_file_size: None,
            cache_ttl_secs: None,
        },
    ));
    (table, pipeline)
}

fn track(table: &AssetTable, url: &str) {
    table.insert(Asset::new(
        url.to_string(),
        url.to_string(),
        classify(url, None),
        DiscoveryMethod::Srcset,
    ));
}

#[tokio::test]
async fn downloaded_asset_checksum_matches_file_on_disk() {
    let mut server = mockito::Server::new_async().await;
    let body = b"fn main() {} // definitely javascript".to_vec();
    server
        .mock("GET", "/js/app.js")
        .with_status(200)
        .with_header("content-type", "application/javascript")
        .with_body(body.clone())
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let (table, pipeline) = make_pipeline(dir.path());
    let url = format!("{}/js/app.js", server.url());
    track(&table, &url);

    let asset = pipeline.fetch(&url).await.expect("fetch");
    assert_eq!(asset.status, DownloadStatus::Downloaded);

    // Invariant: status = downloaded => local file exists and hashes to
    // the recorded checksum.
    let local = asset.local_path.expect("local path");
    let bytes = std::fs::read(dir.path().join(&local)).expect("file exists");
    assert_eq!(
        hex::encode(Sha256::digest(&bytes)),
        asset.checksum.expect("checksum recorded")
    );
    assert_eq!(asset.actual_size, Some(bytes.len() as u64));
}

#[tokio::test]
async fn vue_cli_srcset_scenario_end_to_end() {
    // Page carries <img srcset="/img/a.png 1x, /img/a@2x.png 2x"> and the
    // detector sees a Vue-CLI site at 0.9 confidence.
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/img/a.png")
        .with_status(200)
        .with_body("png-1x")
        .create_async()
        .await;
    server
        .mock("GET", "/img/a@2x.png")
        .with_status(200)
        .with_body("png-2x")
        .create_async()
        .await;

    let observations = PageObservations {
        has_vue_markers: true,
        script_srcs: vec![
            "/js/chunk-vendors.8f1a.js".to_string(),
            "/js/app.3c2b.js".to_string(),
        ],
        ..Default::default()
    };
    let fingerprint = detect(&observations);
    assert_eq!(fingerprint.tool, BuildTool::VueCli);
    assert!((fingerprint.confidence - 0.9).abs() < f64::EPSILON);

    let dir = tempfile::tempdir().expect("tempdir");
    let (table, pipeline) = make_pipeline(dir.path());
    pipeline.set_strategy(PathStrategy::for_fingerprint(&fingerprint));

    let base = server.url();
    let one_x = format!("{base}/img/a.png");
    let two_x = format!("{base}/img/a@2x.png");
    track(&table, &one_x);
    track(&table, &two_x);

    let a = pipeline.fetch(&one_x).await.expect("1x fetch");
    let b = pipeline.fetch(&two_x).await.expect("2x fetch");
    assert_eq!(a.local_path.as_deref(), Some("img/a.png"));
    assert_eq!(b.local_path.as_deref(), Some("img/a@2x.png"));

    // Rewrite the page: srcset descriptors survive, base href appears.
    let html = r#"<html><head><title>t</title></head><body><img srcset="/img/a.png 1x, /img/a@2x.png 2x"></body></html>"#;
    let rewriter = Rewriter::new(Arc::clone(&table), Arc::new(UrlResolver::new()));
    let (rewritten, count) = rewriter
        .rewrite_page(html, &format!("{base}/"), Path::new("index.html"))
        .expect("rewrite");

    assert_eq!(count, 1);
    assert!(rewritten.contains(r#"srcset="img/a.png 1x, img/a@2x.png 2x""#));
    assert!(rewritten.contains(r#"<base href="./">"#));

    // Idempotence: rewriting the rewritten page changes nothing.
    let (again, _) = rewriter
        .rewrite_page(&rewritten, &format!("{base}/"), Path::new("index.html"))
        .expect("second rewrite");
    assert_eq!(rewritten, again);
}

#[tokio::test]
async fn recursive_css_references_rewrite_relative_to_the_sheet() {
    // A stylesheet at /styles/main.css importing ./fonts.css and
    // ../img/bg.png; both downloaded; rewrite emits sheet-relative paths.
    let dir = tempfile::tempdir().expect("tempdir");
    let table = Arc::new(AssetTable::new());

    for (url, local) in [
        ("https://site.test/styles/fonts.css", "css/fonts.css"),
        ("https://site.test/img/bg.png", "img/bg.png"),
        ("https://site.test/styles/main.css", "css/main.css"),
    ] {
        table.insert(Asset::new(
            url.to_string(),
            url.to_string(),
            classify(url, None),
            DiscoveryMethod::RecursiveCss,
        ));
        table.begin_download(url);
        table.commit_download(url, local.to_string(), 4, "feed".to_string(), None);
    }

    let rewriter = Rewriter::new(Arc::clone(&table), Arc::new(UrlResolver::new()));
    let css = "@import url(./fonts.css);\nbody { background: url(../img/bg.png); }";
    let (rewritten, count) = rewriter.rewrite_stylesheet(
        css,
        "https://site.test/styles/main.css",
        Path::new("css/main.css"),
    );

    assert_eq!(count, 2);
    assert!(rewritten.contains("url(fonts.css)"));
    assert!(rewritten.contains("url(../img/bg.png)"));
    drop(dir);
}
