//! Cache store integration: hit semantics, corruption handling and the
//! archive round-trip law.

use std::collections::BTreeMap;
use std::path::Path;

use sitemirror::cache::{cache_key, export_archive, import_archive, CacheConfig, CacheStore, SetOptions};

async fn open_store(root: &Path) -> CacheStore {
    CacheStore::open(CacheConfig {
        root: root.join(".cache"),
        max_size: 50 * 1024 * 1024,
        default_ttl_secs: 3600,
        retention_secs: 7 * 24 * 3600,
    })
    .await
    .expect("open cache")
}

#[tokio::test]
async fn cache_hit_after_set_returns_same_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let headers = BTreeMap::new();

    store
        .set(
            "https://x/y.css",
            b"body { margin: 0 }",
            &headers,
            SetOptions {
                content_type: Some("text/css".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("set");

    let hit = store.get("https://x/y.css", &headers).await.expect("cache hit");
    assert_eq!(hit.bytes, b"body { margin: 0 }");
    assert_eq!(hit.content_type.as_deref(), Some("text/css"));
}

#[tokio::test]
async fn corrupted_data_file_yields_miss_and_removal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let headers = BTreeMap::new();

    store
        .set("https://x/y.css", &vec![9u8; 4096], &headers, SetOptions::default())
        .await
        .expect("set");

    let key = cache_key("https://x/y.css", &headers);
    std::fs::write(
        dir.path().join(".cache").join(format!("{key}.data")),
        b"not the payload",
    )
    .expect("corrupt");

    assert!(store.get("https://x/y.css", &headers).await.is_none());
    // Entry is gone, not just skipped.
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn archive_export_clear_import_restores_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let headers = BTreeMap::new();

    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), "integration".to_string());

    for i in 0..5 {
        store
            .set(
                &format!("https://x/file-{i}.js"),
                format!("console.log({i});").as_bytes(),
                &headers,
                SetOptions {
                    content_type: Some("application/javascript".to_string()),
                    metadata: metadata.clone(),
                    ..Default::default()
                },
            )
            .await
            .expect("set");
    }

    let archive = dir.path().join("export.json.gz");
    assert_eq!(export_archive(&store, &archive).await.expect("export"), 5);

    store.clear().await.expect("clear");
    assert!(store.is_empty().await);

    assert_eq!(import_archive(&store, &archive).await.expect("import"), 5);

    for i in 0..5 {
        let item = store
            .get(&format!("https://x/file-{i}.js"), &headers)
            .await
            .expect("restored entry");
        assert_eq!(item.bytes, format!("console.log({i});").as_bytes());
        assert_eq!(
            item.metadata.get("source").map(String::as_str),
            Some("integration")
        );
        assert_eq!(item.content_type.as_deref(), Some("application/javascript"));
    }
}
