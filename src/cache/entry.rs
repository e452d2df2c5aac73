//! Cache entry metadata
//!
//! Each cached blob (`<key>.data`) is paired with a sibling `<key>.meta`
//! JSON file carrying this record. The in-memory index mirrors the same
//! records so reads can check TTL and integrity without touching the blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one cached response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex xxh3 of the normalized URL plus contributing request headers
    pub key: String,
    /// Original request URL (normalized)
    pub url: String,
    /// Request headers that contributed to the key
    pub headers: BTreeMap<String, String>,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
    /// When the entry was last read
    pub last_accessed: DateTime<Utc>,
    /// Uncompressed payload size in bytes
    pub size: u64,
    /// Size of the blob as stored on disk
    pub stored_size: u64,
    /// Original Content-Type
    pub content_type: Option<String>,
    /// Whether the blob is gzip-compressed on disk
    pub compressed: bool,
    /// Hex xxh3 of the uncompressed payload
    pub checksum: String,
    /// Per-entry time-to-live in seconds
    pub ttl_secs: u64,
    /// Caller-supplied metadata carried alongside the payload
    #[serde(default)]
    pub user_metadata: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Whether the entry's own TTL has elapsed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.stored_at);
        age.num_seconds() >= 0 && age.num_seconds() as u64 >= self.ttl_secs
    }

    /// Whether the entry is past the global retention window
    #[must_use]
    pub fn is_beyond_retention(&self, now: DateTime<Utc>, retention_secs: u64) -> bool {
        let age = now.signed_duration_since(self.stored_at);
        age.num_seconds() >= 0 && age.num_seconds() as u64 >= retention_secs
    }
}

/// Compute the cache key for a URL and its contributing request headers.
///
/// Headers are folded in sorted order so the key is independent of caller
/// iteration order.
#[must_use]
pub fn cache_key(normalized_url: &str, headers: &BTreeMap<String, String>) -> String {
    let mut material = String::with_capacity(normalized_url.len() + 32);
    material.push_str(normalized_url);
    for (name, value) in headers {
        material.push('\n');
        material.push_str(&name.to_lowercase());
        material.push(':');
        material.push_str(value);
    }
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(material.as_bytes()))
}

/// Checksum of a payload, stored in the index for integrity verification
#[must_use]
pub fn payload_checksum(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}
