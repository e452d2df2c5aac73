//! Session state machine
//!
//! A session advances monotonically through
//! `created → analyzing → crawling → verifying → processing → completed`;
//! the only backward edge is `interrupted → resuming → crawling`. Terminal
//! states never transition. The full state is serializable so a session
//! survives process death and resumes from its last checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::assets::Asset;
use crate::config::CloneConfig;
use crate::utils::constants::{MAX_RESUME_POINTS, RECOVERY_HORIZON_SECS};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Analyzing,
    Crawling,
    Verifying,
    Processing,
    Completed,
    Interrupted,
    Error,
    Timeout,
    Resuming,
}

impl SessionStatus {
    /// Terminal states never transition again
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Timeout)
    }

    /// States that count as actively working
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Analyzing | Self::Crawling | Self::Verifying | Self::Processing | Self::Resuming
        )
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// Forward progress plus the resume loop; any active state may fall to
    /// `Interrupted`, `Error` or `Timeout`.
    #[must_use]
    pub fn may_transition(self, to: Self) -> bool {
        use SessionStatus::{
            Analyzing, Completed, Crawling, Created, Error, Interrupted, Processing, Resuming,
            Timeout, Verifying,
        };

        if self.is_terminal() {
            return false;
        }
        if self == to {
            return true;
        }

        match (self, to) {
            // Forward phase order.
            (Created, Analyzing)
            | (Analyzing, Crawling)
            | (Crawling, Verifying)
            | (Verifying, Processing)
            | (Processing, Completed)
            // Failure edges from any non-terminal state.
            | (_, Error)
            | (_, Timeout)
            // Interruption and recovery.
            | (Created | Analyzing | Crawling | Verifying | Processing, Interrupted)
            | (Interrupted, Resuming)
            | (Resuming, Crawling) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Analyzing => "analyzing",
            Self::Crawling => "crawling",
            Self::Verifying => "verifying",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Resuming => "resuming",
        };
        write!(f, "{name}")
    }
}

/// Kinds of entries in the resume-point ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePointKind {
    SessionResumed,
    ProgressCheckpoint,
    SessionCompleted,
}

/// One recoverable point in the session log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePoint {
    pub kind: ResumePointKind,
    pub at: DateTime<Utc>,
    pub progress: f32,
    pub processed_urls: usize,
}

/// Accumulated per-session statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub pages_crawled: usize,
    pub assets_discovered: usize,
    pub assets_downloaded: usize,
    pub assets_failed: usize,
    pub bytes_downloaded: u64,
    /// Phase name -> elapsed milliseconds
    pub phase_durations_ms: HashMap<String, u64>,
}

/// Durable state of one mirroring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub start_url: String,
    pub status: SessionStatus,
    /// Progress in [0,100]
    pub progress: f32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub resume_count: u32,
    pub last_checkpoint: Option<DateTime<Utc>>,
    /// Options snapshot the session runs under
    pub options: CloneConfig,
    pub stats: SessionStats,
    /// Asset table snapshot at last checkpoint
    pub assets: Vec<Asset>,
    pub visited_urls: Vec<String>,
    pub queued_urls: Vec<String>,
    /// Opaque browser cookies / local-storage snapshot
    pub browser_state: Option<serde_json::Value>,
    pub error_log: Vec<String>,
    /// Ring buffer of recent resume points
    pub resume_points: VecDeque<ResumePoint>,
    /// Session output directory (under the configured root)
    pub output_dir: PathBuf,
    /// Recoverability verdict computed at startup
    #[serde(default)]
    pub can_recover: bool,
}

impl SessionState {
    /// Fresh session for a start request
    #[must_use]
    pub fn new(options: CloneConfig) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let output_dir = options.output_root().join(&id);
        Self {
            id,
            start_url: options.start_url().to_string(),
            status: SessionStatus::Created,
            progress: 0.0,
            started_at: Utc::now(),
            ended_at: None,
            resume_count: 0,
            last_checkpoint: None,
            options,
            stats: SessionStats::default(),
            assets: Vec::new(),
            visited_urls: Vec::new(),
            queued_urls: Vec::new(),
            browser_state: None,
            error_log: Vec::new(),
            resume_points: VecDeque::new(),
            output_dir,
            can_recover: false,
        }
    }

    /// Append a resume point, evicting the oldest past the ring capacity
    pub fn push_resume_point(&mut self, kind: ResumePointKind) {
        self.resume_points.push_back(ResumePoint {
            kind,
            at: Utc::now(),
            progress: self.progress,
            processed_urls: self.visited_urls.len(),
        });
        while self.resume_points.len() > MAX_RESUME_POINTS {
            self.resume_points.pop_front();
        }
    }

    /// Recoverability rule evaluated at startup.
    ///
    /// All must hold: started within the last hour, output directory still
    /// present, and the pre-interruption status was an in-flight one.
    #[must_use]
    pub fn evaluate_recoverable(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.started_at);
        if age.num_seconds() < 0 || age.num_seconds() > RECOVERY_HORIZON_SECS {
            return false;
        }
        if !self.output_dir.exists() {
            return false;
        }
        matches!(
            self.status,
            SessionStatus::Crawling
                | SessionStatus::Processing
                | SessionStatus::Created
                | SessionStatus::Analyzing
                | SessionStatus::Interrupted
        )
    }
}
