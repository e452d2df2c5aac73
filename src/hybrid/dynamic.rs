//! Dynamic extraction path
//!
//! Attaches a network-response observer to the live page, fires the same
//! lazy-loading triggers the analyzer uses, then harvests the settled DOM.
//! The observed network log is restricted to asset resource types; page
//! navigation chatter and XHR payloads are not assets.

use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::analyzer::js_scripts::{HARVEST_SCRIPT, LAZY_TRIGGER_SCRIPT};
use crate::analyzer::HarvestedRefs;
use crate::error::{CloneError, CloneResult};

/// Output of the dynamic path
#[derive(Debug, Default)]
pub struct DynamicExtraction {
    /// URLs observed as network responses (asset resource types only)
    pub network_urls: Vec<String>,
    /// DOM harvest after lazy triggers settled
    pub harvest: HarvestedRefs,
}

/// Run dynamic discovery against a live page.
///
/// The page is assumed to be navigated already. Aborts cleanly if the
/// page handle closes mid-flight: evaluate errors surface as `HtmlParse`
/// and the caller isolates them to the dynamic path.
pub async fn extract_dynamic(page: &Page, settle: Duration) -> CloneResult<DynamicExtraction> {
    let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut events = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| CloneError::HtmlParse(format!("network observer: {e}")))?;

    let sink = Arc::clone(&observed);
    let observer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let is_asset = matches!(
                event.r#type,
                ResourceType::Image
                    | ResourceType::Stylesheet
                    | ResourceType::Script
                    | ResourceType::Font
                    | ResourceType::Media
            );
            if is_asset
                && let Ok(mut urls) = sink.lock()
            {
                urls.push(event.response.url.clone());
            }
        }
    });

    // Fire the lazy mechanisms and give late responses a settle window.
    if let Err(e) = page.evaluate(LAZY_TRIGGER_SCRIPT).await {
        warn!("Lazy triggers failed during dynamic extraction: {e}");
    }
    tokio::time::sleep(settle).await;

    let harvest: HarvestedRefs = page
        .evaluate(HARVEST_SCRIPT)
        .await
        .map_err(|e| {
            observer.abort();
            CloneError::HtmlParse(format!("dynamic harvest: {e}"))
        })?
        .into_value()
        .map_err(|e| {
            observer.abort();
            CloneError::HtmlParse(format!("dynamic harvest result: {e}"))
        })?;

    observer.abort();

    let network_urls = {
        let mut urls = observed.lock().map_or_else(|e| e.into_inner().clone(), |u| u.clone());
        let mut seen = std::collections::HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));
        urls
    };
    debug!(
        "Dynamic extraction: {} network responses, {} DOM stylesheets",
        network_urls.len(),
        harvest.stylesheets.len()
    );

    Ok(DynamicExtraction {
        network_urls,
        harvest,
    })
}
