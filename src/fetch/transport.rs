//! HTTP transport
//!
//! Thin wrapper over `reqwest` presenting browser-like headers, a bounded
//! per-request timeout and a fixed redirect budget. Transport errors are
//! classified into the error taxonomy so the retry manager can branch on
//! kind instead of message text.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CloneError, CloneResult, NetworkKind};
use crate::utils::constants::BROWSER_USER_AGENT;

/// Maximum redirects before failing with `Network(TooManyRedirects)`
const MAX_REDIRECTS: usize = 10;

/// One completed HTTP exchange
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub bytes: Vec<u8>,
    /// URL after redirects
    pub final_url: String,
}

impl TransportResponse {
    /// Content-Type header, if present
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// Parsed Content-Length header, if present
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length")?.parse().ok()
    }
}

/// Browser-like HTTP client shared by the fetch pipeline and verifier
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with browser-like defaults.
    pub fn new() -> CloneResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| CloneError::Io(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Issue a GET with the standard browser-like header set.
    ///
    /// Returns the response regardless of status; callers decide which
    /// statuses are errors. Network- and timeout-level failures map into
    /// the taxonomy.
    ///
    /// # Arguments
    /// * `url` - Absolute URL to fetch
    /// * `extra_headers` - Headers merged over the defaults
    /// * `timeout` - Total deadline for the exchange
    pub async fn fetch(
        &self,
        url: &str,
        extra_headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> CloneResult<TransportResponse> {
        let mut request = self
            .client
            .get(url)
            .timeout(timeout)
            .header("Accept", "*/*")
            .header("Accept-Language", "en-US,en;q=0.9");

        for (name, value) in extra_headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| classify_error(&e, timeout))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = header_map(response.headers());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_error(&e, timeout))?;

        Ok(TransportResponse {
            status,
            headers,
            bytes: bytes.to_vec(),
            final_url,
        })
    }

    /// Issue a HEAD request, used by the payload analyzer for sizing.
    pub async fn head(
        &self,
        url: &str,
        timeout: Duration,
    ) -> CloneResult<TransportResponse> {
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .header("Accept", "*/*")
            .send()
            .await
            .map_err(|e| classify_error(&e, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = header_map(response.headers());

        Ok(TransportResponse {
            status,
            headers,
            bytes: Vec::new(),
            final_url,
        })
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

/// Map a reqwest error onto the taxonomy
fn classify_error(err: &reqwest::Error, timeout: Duration) -> CloneError {
    if err.is_timeout() {
        return CloneError::Timeout(timeout);
    }
    if err.is_redirect() {
        return CloneError::Network(NetworkKind::TooManyRedirects);
    }

    let message = err.to_string().to_lowercase();
    let kind = if message.contains("dns") || message.contains("resolve") {
        NetworkKind::DnsNotFound
    } else if message.contains("refused") {
        NetworkKind::ConnectionRefused
    } else if message.contains("reset") {
        NetworkKind::ConnectionReset
    } else if message.contains("unreachable") {
        NetworkKind::HostUnreachable
    } else {
        NetworkKind::Other
    };
    CloneError::Network(kind)
}
