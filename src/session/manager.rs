//! Durable session management
//!
//! Persists every session under `<root>/<session-id>/session-state.json`
//! with a global `<root>/sessions.json` index, both written atomically.
//! At startup, sessions that were active when the process died are marked
//! `interrupted` and evaluated against the recoverability rule; resumable
//! sessions re-enter `crawling` with their accumulated collections intact.

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::state::{ResumePointKind, SessionState, SessionStatus};
use crate::error::{CloneError, CloneResult};
use crate::utils::constants::{CHECKPOINT_INTERVAL_SECS, CHECKPOINT_URL_INTERVAL};
use crate::utils::fs::atomic_write;

/// Ceiling on concurrently tracked sessions
const MAX_SESSIONS: usize = 64;

/// Sessions older than this are purged by `purge_expired` (7 days)
const SESSION_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

/// Row in the global `sessions.json` index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub start_url: String,
    pub status: SessionStatus,
    pub progress: f32,
    pub started_at: chrono::DateTime<Utc>,
    pub asset_count: usize,
    pub can_recover: bool,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            id: state.id.clone(),
            start_url: state.start_url.clone(),
            status: state.status,
            progress: state.progress,
            started_at: state.started_at,
            asset_count: state.assets.len(),
            can_recover: state.can_recover,
        }
    }
}

/// Checkpoint bookkeeping per session
#[derive(Debug, Default)]
struct CheckpointClock {
    urls_since_checkpoint: usize,
}

/// Thread-safe manager over all sessions under one root
#[derive(Clone)]
pub struct SessionManager {
    root: PathBuf,
    sessions: Arc<Mutex<HashMap<String, SessionState>>>,
    clocks: Arc<Mutex<HashMap<String, CheckpointClock>>>,
}

impl SessionManager {
    /// Open a manager rooted at `root`, loading persisted sessions and
    /// marking previously active ones as interrupted.
    pub async fn open(root: &Path) -> CloneResult<Self> {
        tokio::fs::create_dir_all(root).await.map_err(CloneError::from)?;

        let manager = Self {
            root: root.to_path_buf(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            clocks: Arc::new(Mutex::new(HashMap::new())),
        };
        manager.load_persisted().await;
        manager.mark_interrupted().await?;
        Ok(manager)
    }

    /// Create and persist a new session.
    pub async fn create(&self, options: crate::config::CloneConfig) -> CloneResult<SessionState> {
        {
            let sessions = self.sessions.lock().await;
            if sessions.len() >= MAX_SESSIONS {
                return Err(CloneError::TooManySessions);
            }
        }

        let state = SessionState::new(options);
        tokio::fs::create_dir_all(&state.output_dir)
            .await
            .map_err(CloneError::from)?;

        self.sessions
            .lock()
            .await
            .insert(state.id.clone(), state.clone());
        self.persist(&state).await?;
        info!("Created session {} for {}", state.id, state.start_url);
        Ok(state)
    }

    /// Fetch a session by id
    pub async fn get(&self, id: &str) -> CloneResult<SessionState> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CloneError::SessionNotFound(id.to_string()))
    }

    /// Summaries of all known sessions
    pub async fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .lock()
            .await
            .values()
            .map(SessionSummary::from)
            .collect()
    }

    /// Transition a session's status, enforcing the state machine.
    pub async fn update_status(&self, id: &str, to: SessionStatus) -> CloneResult<SessionState> {
        let state = {
            let mut sessions = self.sessions.lock().await;
            let state = sessions
                .get_mut(id)
                .ok_or_else(|| CloneError::SessionNotFound(id.to_string()))?;

            if !state.status.may_transition(to) {
                return Err(CloneError::InternalInvariant(format!(
                    "illegal session transition {} -> {to} for {id}",
                    state.status
                )));
            }
            state.status = to;
            if to.is_terminal() {
                state.ended_at = Some(Utc::now());
            }
            if to == SessionStatus::Completed {
                state.progress = 100.0;
                state.push_resume_point(ResumePointKind::SessionCompleted);
            }
            state.clone()
        };

        self.persist(&state).await?;
        Ok(state)
    }

    /// Apply a mutation to a session and persist the result.
    pub async fn update<F>(&self, id: &str, mutate: F) -> CloneResult<SessionState>
    where
        F: FnOnce(&mut SessionState),
    {
        let state = {
            let mut sessions = self.sessions.lock().await;
            let state = sessions
                .get_mut(id)
                .ok_or_else(|| CloneError::SessionNotFound(id.to_string()))?;
            mutate(state);
            state.clone()
        };
        self.persist(&state).await?;
        Ok(state)
    }

    /// Record processed URLs and checkpoint when due.
    ///
    /// A checkpoint is written every `CHECKPOINT_INTERVAL_SECS` or every
    /// `CHECKPOINT_URL_INTERVAL` processed URLs, whichever comes first.
    pub async fn note_progress(
        &self,
        id: &str,
        processed_urls: usize,
        progress: f32,
    ) -> CloneResult<bool> {
        let due = {
            let mut clocks = self.clocks.lock().await;
            let clock = clocks.entry(id.to_string()).or_default();
            clock.urls_since_checkpoint += processed_urls;

            let sessions = self.sessions.lock().await;
            let state = sessions
                .get(id)
                .ok_or_else(|| CloneError::SessionNotFound(id.to_string()))?;

            let interval_due = state.last_checkpoint.is_none_or(|at| {
                Utc::now().signed_duration_since(at).num_seconds() as u64
                    >= CHECKPOINT_INTERVAL_SECS
            });
            let urls_due = clock.urls_since_checkpoint >= CHECKPOINT_URL_INTERVAL;

            if interval_due || urls_due {
                clock.urls_since_checkpoint = 0;
                true
            } else {
                false
            }
        };

        self.update(id, |state| {
            state.progress = progress;
            if due {
                state.last_checkpoint = Some(Utc::now());
                state.push_resume_point(ResumePointKind::ProgressCheckpoint);
            }
        })
        .await?;

        Ok(due)
    }

    /// Request a resume of an interrupted session.
    ///
    /// Validates recoverability, transitions through `resuming` back into
    /// `crawling`, bumps the resume counter and preserves accumulated
    /// collections.
    pub async fn resume(&self, id: &str) -> CloneResult<SessionState> {
        let state = self.get(id).await?;

        if state.status != SessionStatus::Interrupted {
            return Err(CloneError::SessionNotRecoverable(format!(
                "{id} is {} not interrupted",
                state.status
            )));
        }
        if !state.can_recover {
            return Err(CloneError::SessionNotRecoverable(id.to_string()));
        }

        self.update_status(id, SessionStatus::Resuming).await?;
        let state = self
            .update(id, |state| {
                state.resume_count += 1;
                state.push_resume_point(ResumePointKind::SessionResumed);
            })
            .await?;
        info!(
            "Session {id} resuming (attempt {}), {} assets retained",
            state.resume_count,
            state.assets.len()
        );
        self.update_status(id, SessionStatus::Crawling).await
    }

    /// Delete a session's record and state file (explicit purge).
    pub async fn delete(&self, id: &str) -> CloneResult<()> {
        let removed = self.sessions.lock().await.remove(id);
        if removed.is_none() {
            return Err(CloneError::SessionNotFound(id.to_string()));
        }
        self.clocks.lock().await.remove(id);

        let state_file = self.root.join(id).join("session-state.json");
        let _ = tokio::fs::remove_file(&state_file).await;
        self.persist_index().await?;
        info!("Deleted session {id}");
        Ok(())
    }

    /// Remove sessions past the retention horizon.
    pub async fn purge_expired(&self) -> CloneResult<usize> {
        let now = Utc::now();
        let expired: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .filter(|s| {
                    now.signed_duration_since(s.started_at).num_seconds() > SESSION_RETENTION_SECS
                })
                .map(|s| s.id.clone())
                .collect()
        };

        for id in &expired {
            if let Err(e) = self.delete(id).await {
                warn!("Failed to purge expired session {id}: {e}");
            }
        }
        Ok(expired.len())
    }

    /// Sessions currently marked interrupted and recoverable
    pub async fn recoverable_sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::Interrupted && s.can_recover)
            .map(SessionSummary::from)
            .collect()
    }

    /// Load persisted session files under the root
    async fn load_persisted(&self) {
        let index_path = self.root.join("sessions.json");
        let Ok(bytes) = tokio::fs::read(&index_path).await else {
            return;
        };
        let Ok(index) = serde_json::from_slice::<HashMap<String, SessionSummary>>(&bytes) else {
            warn!("Unreadable sessions index, starting empty");
            return;
        };

        let mut sessions = self.sessions.lock().await;
        for id in index.keys() {
            let state_path = self.root.join(id).join("session-state.json");
            match tokio::fs::read(&state_path).await {
                Ok(bytes) => match serde_json::from_slice::<SessionState>(&bytes) {
                    Ok(state) => {
                        sessions.insert(state.id.clone(), state);
                    }
                    Err(e) => warn!("Skipping unreadable session state {id}: {e}"),
                },
                Err(e) => debug!("Session {id} has no state file: {e}"),
            }
        }
        info!("Loaded {} persisted sessions", sessions.len());
    }

    /// Mark sessions that were active at last shutdown as interrupted and
    /// evaluate recoverability. A session already `completed` is never
    /// touched.
    async fn mark_interrupted(&self) -> CloneResult<()> {
        let now = Utc::now();
        let changed: Vec<SessionState> = {
            let mut sessions = self.sessions.lock().await;
            let mut changed = Vec::new();
            for state in sessions.values_mut() {
                if state.status.is_terminal() {
                    continue;
                }
                if state.status.is_active() || state.status == SessionStatus::Created {
                    state.can_recover = state.evaluate_recoverable(now);
                    if state.status != SessionStatus::Interrupted {
                        state.status = SessionStatus::Interrupted;
                    }
                    changed.push(state.clone());
                } else if state.status == SessionStatus::Interrupted {
                    state.can_recover = state.evaluate_recoverable(now);
                    changed.push(state.clone());
                }
            }
            changed
        };

        for state in &changed {
            self.persist(state).await?;
            info!(
                "Session {} marked interrupted (recoverable: {})",
                state.id, state.can_recover
            );
        }
        Ok(())
    }

    /// Write one session's state file and refresh the global index.
    async fn persist(&self, state: &SessionState) -> CloneResult<()> {
        let state_path = self.root.join(&state.id).join("session-state.json");
        let json = serde_json::to_vec_pretty(state).map_err(|e| CloneError::Io(e.to_string()))?;
        atomic_write(&state_path, json)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))?;
        self.persist_index().await
    }

    async fn persist_index(&self) -> CloneResult<()> {
        let index: HashMap<String, SessionSummary> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .map(|(id, state)| (id.clone(), SessionSummary::from(state)))
                .collect()
        };
        let json = serde_json::to_vec_pretty(&index).map_err(|e| CloneError::Io(e.to_string()))?;
        atomic_write(&self.root.join("sessions.json"), json)
            .await
            .map_err(|e| CloneError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &Path) -> crate::config::CloneConfig {
        crate::config::CloneConfig::builder()
            .output_root(root)
            .start_url("https://example.com")
            .build()
            .expect("config")
    }

    #[tokio::test]
    async fn create_persists_state_and_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::open(dir.path()).await.expect("open");
        let state = manager.create(config(dir.path())).await.expect("create");

        assert!(dir
            .path()
            .join(&state.id)
            .join("session-state.json")
            .exists());
        assert!(dir.path().join("sessions.json").exists());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::open(dir.path()).await.expect("open");
        let state = manager.create(config(dir.path())).await.expect("create");

        let err = manager
            .update_status(&state.id, SessionStatus::Completed)
            .await
            .expect_err("created cannot jump to completed");
        assert!(matches!(err, CloneError::InternalInvariant(_)));
    }

    #[tokio::test]
    async fn interrupted_session_recovers_preserving_collections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = {
            let manager = SessionManager::open(dir.path()).await.expect("open");
            let state = manager.create(config(dir.path())).await.expect("create");
            manager
                .update_status(&state.id, SessionStatus::Analyzing)
                .await
                .expect("analyzing");
            manager
                .update_status(&state.id, SessionStatus::Crawling)
                .await
                .expect("crawling");
            manager
                .update(&state.id, |s| {
                    s.progress = 65.0;
                    s.visited_urls.push("https://example.com/".to_string());
                    s.queued_urls.push("https://example.com/about".to_string());
                    s.assets.push(crate::assets::Asset::new(
                        "https://example.com/a.css".to_string(),
                        "/a.css".to_string(),
                        crate::assets::AssetType::Stylesheet,
                        crate::assets::DiscoveryMethod::DomScan,
                    ));
                    s.assets.push(crate::assets::Asset::new(
                        "https://example.com/a.js".to_string(),
                        "/a.js".to_string(),
                        crate::assets::AssetType::Javascript,
                        crate::assets::DiscoveryMethod::DomScan,
                    ));
                })
                .await
                .expect("update");
            state.id
        };

        // Simulated restart: reopen the manager over the same root.
        let manager = SessionManager::open(dir.path()).await.expect("reopen");
        let state = manager.get(&id).await.expect("loaded");
        assert_eq!(state.status, SessionStatus::Interrupted);
        assert!(state.can_recover, "fresh interrupted session is recoverable");

        let resumed = manager.resume(&id).await.expect("resume");
        assert_eq!(resumed.status, SessionStatus::Crawling);
        assert_eq!(resumed.resume_count, 1);
        assert_eq!(resumed.assets.len(), 2);
        assert_eq!(resumed.queued_urls.len(), 1);
        assert!((resumed.progress - 65.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn completed_sessions_survive_restart_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = {
            let manager = SessionManager::open(dir.path()).await.expect("open");
            let state = manager.create(config(dir.path())).await.expect("create");
            for status in [
                SessionStatus::Analyzing,
                SessionStatus::Crawling,
                SessionStatus::Verifying,
                SessionStatus::Processing,
                SessionStatus::Completed,
            ] {
                manager.update_status(&state.id, status).await.expect("advance");
            }
            state.id
        };

        let manager = SessionManager::open(dir.path()).await.expect("reopen");
        let state = manager.get(&id).await.expect("loaded");
        assert_eq!(state.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::open(dir.path()).await.expect("open");
        let state = manager.create(config(dir.path())).await.expect("create");

        manager.delete(&state.id).await.expect("delete");
        assert!(matches!(
            manager.get(&state.id).await,
            Err(CloneError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn checkpoint_due_after_url_interval() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = SessionManager::open(dir.path()).await.expect("open");
        let state = manager.create(config(dir.path())).await.expect("create");

        // First call is due (no checkpoint yet).
        assert!(manager.note_progress(&state.id, 1, 1.0).await.expect("progress"));
        // Immediately after, not due.
        assert!(!manager.note_progress(&state.id, 1, 2.0).await.expect("progress"));
        // 100 URLs trips the URL interval regardless of time.
        assert!(manager
            .note_progress(&state.id, CHECKPOINT_URL_INTERVAL, 3.0)
            .await
            .expect("progress"));
    }
}
