//! Event stream type definitions
//!
//! Messages emitted during a mirroring session form a closed tagged-variant
//! universe; the `type` discriminator is the wire-level tag consumers
//! dispatch on. Transport of the stream (channels, sockets, logs) is the
//! embedder's concern.

use serde::{Deserialize, Serialize};

use crate::assets::AssetCounts;
use crate::session::SessionStatus;

/// Compact asset summary carried by `asset_found`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSummary {
    pub url: String,
    pub asset_type: String,
    pub discovery_method: String,
    pub critical: bool,
    pub expected_size: Option<u64>,
}

/// All messages a session can emit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloneEvent {
    /// Session status and coarse progress
    StatusUpdate {
        session_id: String,
        status: SessionStatus,
        progress: f32,
        assets: AssetCounts,
    },
    /// Pre-crawl reconnaissance finished
    PayloadAnalysisComplete {
        session_id: String,
        total_assets: usize,
        total_bytes: u64,
        completeness_score: u32,
        critical_count: usize,
        estimated_seconds: u64,
    },
    /// Fine-grained progress tick
    ProgressUpdate {
        session_id: String,
        progress: f32,
        current_url: Option<String>,
    },
    /// A new asset entered the table
    AssetFound {
        session_id: String,
        asset: AssetSummary,
    },
    /// Verification finished
    CompletenessVerificationComplete {
        session_id: String,
        completeness_percent: f32,
        quality_score: f32,
        missing: usize,
        failed: usize,
        recovered: usize,
    },
    /// Path-alias symlinks were created
    SymlinksCreated { session_id: String, count: usize },
    /// An interrupted session can be resumed
    SessionRecoveryAvailable {
        session_id: String,
        progress: f32,
        asset_count: usize,
    },
    /// A session resumed successfully
    SessionResumed { session_id: String },
    /// A resume request failed
    SessionResumeFailed { session_id: String, reason: String },
    /// The requested session does not exist
    SessionNotFound { session_id: String },
    /// Consumer connectivity changed
    ConnectionStatus { connected: bool },
    /// A session-level error
    Error {
        session_id: String,
        kind: String,
        message: String,
    },
}

impl CloneEvent {
    /// The wire-level discriminator for this event
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::StatusUpdate { .. } => "status_update",
            Self::PayloadAnalysisComplete { .. } => "payload_analysis_complete",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::AssetFound { .. } => "asset_found",
            Self::CompletenessVerificationComplete { .. } => {
                "completeness_verification_complete"
            }
            Self::SymlinksCreated { .. } => "symlinks_created",
            Self::SessionRecoveryAvailable { .. } => "session_recovery_available",
            Self::SessionResumed { .. } => "session_resumed",
            Self::SessionResumeFailed { .. } => "session_resume_failed",
            Self::SessionNotFound { .. } => "session_not_found",
            Self::ConnectionStatus { .. } => "connection_status",
            Self::Error { .. } => "error",
        }
    }
}
