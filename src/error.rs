//! Error taxonomy for mirroring operations
//!
//! Every fallible subsystem reports through `CloneError` so that retry and
//! circuit-breaking decisions can branch on error kind instead of string
//! matching. Per-asset failures are recorded on the asset and never abort a
//! session; session-level failures transition the session to a terminal
//! state.

use std::fmt;

/// Transient network failure categories
///
/// These map to the transport-level failures that are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NetworkKind {
    /// Connection reset by peer
    ConnectionReset,
    /// Connection refused by host
    ConnectionRefused,
    /// DNS resolution failed
    DnsNotFound,
    /// Host unreachable
    HostUnreachable,
    /// Redirect chain exceeded the configured maximum
    TooManyRedirects,
    /// Unclassified network-level failure
    Other,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionReset => write!(f, "connection reset"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::DnsNotFound => write!(f, "dns not found"),
            Self::HostUnreachable => write!(f, "host unreachable"),
            Self::TooManyRedirects => write!(f, "too many redirects"),
            Self::Other => write!(f, "network error"),
        }
    }
}

/// Error type shared by all mirroring subsystems
#[derive(Debug, Clone, thiserror::Error)]
pub enum CloneError {
    // -- Transport --
    /// Network-level failure (reset, refused, DNS, unreachable)
    #[error("Network error: {0}")]
    Network(NetworkKind),

    /// Operation exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    // -- Integrity --
    /// Cached blob failed its checksum comparison
    #[error("Cache entry corrupt: {0}")]
    CacheCorrupt(String),

    /// Downloaded bytes do not match the recorded checksum
    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),

    /// A recorded file is absent on disk
    #[error("File missing on disk: {0}")]
    FileMissing(String),

    // -- Capacity --
    /// Cache is full and eviction could not free enough space
    #[error("Cache full: need {needed} bytes, {available} available")]
    CacheFull { needed: u64, available: u64 },

    /// Disk write failed for lack of space
    #[error("Disk full")]
    DiskFull,

    /// Session registry is at capacity
    #[error("Too many sessions")]
    TooManySessions,

    /// A file exceeded the configured size ceiling
    #[error("File of {size} bytes exceeds limit of {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    // -- Policy --
    /// Circuit breaker is open for the target domain
    #[error("Circuit open for domain {0}")]
    CircuitOpen(String),

    /// Global rate limiter denied the request
    #[error("Rate limited, retry after {0:?}")]
    RateLimited(std::time::Duration),

    /// Error kind is not eligible for retry
    #[error("Not retryable: {0}")]
    NotRetryable(String),

    // -- Parse --
    /// HTML could not be parsed
    #[error("HTML parse error: {0}")]
    HtmlParse(String),

    /// Stylesheet could not be parsed
    #[error("CSS parse error: {0}")]
    CssParse(String),

    /// URL is malformed beyond soft recovery
    #[error("Malformed URL: {0}")]
    UrlMalformed(String),

    // -- Session --
    /// No session stored under the requested id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but fails the recoverability rule
    #[error("Session not recoverable: {0}")]
    SessionNotRecoverable(String),

    /// Session aged out of the retention horizon
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Session-wide deadline elapsed
    #[error("Session timed out")]
    SessionTimeout,

    // -- I/O --
    /// Filesystem failure outside the capacity cases above
    #[error("I/O error: {0}")]
    Io(String),

    // -- Fatal --
    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// An internal invariant was violated
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl CloneError {
    /// Map an I/O error, recognizing disk-exhaustion specially
    #[must_use]
    pub fn from_io(err: &std::io::Error) -> Self {
        if err.raw_os_error() == Some(28) {
            // ENOSPC
            Self::DiskFull
        } else {
            Self::Io(err.to_string())
        }
    }

    /// Whether this error terminates the whole session rather than one asset
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::SessionTimeout | Self::InternalInvariant(_) | Self::Cancelled
        )
    }

    /// Short stable tag used when recording failures on assets
    #[must_use]
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::HttpStatus(_) => "http_status",
            Self::CacheCorrupt(_) => "cache_corrupt",
            Self::ChecksumMismatch(_) => "checksum_mismatch",
            Self::FileMissing(_) => "file_missing",
            Self::CacheFull { .. } => "cache_full",
            Self::DiskFull => "disk_full",
            Self::TooManySessions => "too_many_sessions",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::CircuitOpen(_) => "circuit_open",
            Self::RateLimited(_) => "rate_limited",
            Self::NotRetryable(_) => "not_retryable",
            Self::HtmlParse(_) => "html_parse",
            Self::CssParse(_) => "css_parse",
            Self::UrlMalformed(_) => "url_malformed",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionNotRecoverable(_) => "session_not_recoverable",
            Self::SessionExpired(_) => "session_expired",
            Self::SessionTimeout => "session_timeout",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
            Self::InternalInvariant(_) => "internal_invariant",
        }
    }
}

impl From<std::io::Error> for CloneError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(&err)
    }
}

/// Convenience alias for results in mirroring code paths
pub type CloneResult<T> = Result<T, CloneError>;
