//! Headless browser lifecycle
//!
//! Finds a system Chrome/Chromium (or downloads a managed build), launches
//! it through chromiumoxide with a browser-like argument set, and drives
//! the CDP connection on a background task. Pages are created per
//! navigation and closed by their owner.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, info, trace, warn};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::BrowserOptions;
use crate::utils::constants::BROWSER_USER_AGENT;

/// Find a Chrome/Chromium executable on the system.
///
/// `CHROMIUM_PATH` overrides everything; then well-known install paths per
/// platform; then `which` on Unix.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a non-existent file: {}", path.display());
    }

    let paths: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser via 'which': {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium build when no system browser exists.
pub async fn download_managed_browser() -> Result<PathBuf> {
    let download_dir = std::env::temp_dir().join("sitemirror-browser");
    tokio::fs::create_dir_all(&download_dir)
        .await
        .context("Failed to create browser download directory")?;

    info!("Downloading managed Chromium into {}", download_dir.display());
    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&download_dir)
            .build()
            .map_err(|e| anyhow::anyhow!("Fetcher options: {e}"))?,
    );
    let installation = fetcher
        .fetch()
        .await
        .context("Failed to download managed Chromium")?;
    Ok(installation.executable_path)
}

/// Launch a browser and spawn the CDP handler task.
///
/// Returns the browser, the handler task (abort after close) and the
/// profile directory used (unique per process to avoid lock contention).
pub async fn launch_browser(
    options: &BrowserOptions,
) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let user_data_dir =
        std::env::temp_dir().join(format!("sitemirror_chrome_{}", std::process::id()));
    std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(options.viewport_width, options.viewport_height)
        .user_data_dir(user_data_dir.clone())
        .chrome_executable(chrome_path);

    if options.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg(format!("--user-agent={BROWSER_USER_AGENT}"))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-prompt-on-repost")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--ignore-certificate-errors")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let message = e.to_string();
                // Chrome emits CDP events chromiumoxide doesn't model; those
                // deserialization misses are harmless.
                let benign = message
                    .contains("data did not match any variant of untagged enum Message")
                    || message.contains("Failed to deserialize WS response");
                if benign {
                    trace!("Suppressed benign CDP error: {message}");
                } else {
                    warn!("Browser handler error: {message}");
                }
            }
        }
        debug!("Browser handler task completed");
    });

    Ok((browser, handler_task, user_data_dir))
}

/// Navigate a page and wait for it to settle.
///
/// `networkidle` approximation: navigation completes, `document.readyState`
/// reaches `complete`, then a short quiet period for late XHR-driven DOM
/// work. Bounded by `timeout` overall.
pub async fn navigate_idle(page: &Page, url: &str, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;

    tokio::time::timeout_at(deadline, page.goto(url))
        .await
        .map_err(|_| anyhow::anyhow!("Navigation timeout for {url}"))?
        .with_context(|| format!("Navigation failed for {url}"))?;

    tokio::time::timeout_at(deadline, page.wait_for_navigation())
        .await
        .map_err(|_| anyhow::anyhow!("Page load timeout for {url}"))?
        .with_context(|| format!("Page load failed for {url}"))?;

    // Poll readyState until complete or the deadline passes.
    loop {
        let ready: Option<String> = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value().ok());
        if ready.as_deref() == Some("complete") {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("readyState never reached complete for {url}");
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Quiet period for late script-driven work.
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}
