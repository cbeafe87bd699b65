//! Conversation session storage.
//!
//! Sessions live in one map behind a mutex that is never held across I/O.
//! Exchanges on the same session are serialised by a separate per-session
//! turn lock, so a slow collaborator call only blocks its own session.

use chrono::{DateTime, Duration, Utc};
use ragline_common::HistoryMessage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a session. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_history(&self) -> HistoryMessage {
        HistoryMessage::new(self.role.as_str(), self.content.clone())
    }
}

/// A user's ongoing conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub history: Vec<Turn>,
    pub follow_up_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            history: Vec::new(),
            follow_up_count: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Check if the session has been idle for longer than `idle_limit`.
    pub fn is_expired(&self, idle_limit: Duration) -> bool {
        Utc::now() - self.last_activity > idle_limit
    }

    /// Update last activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Drop history and follow-up state, keeping the id.
    pub fn clear(&mut self) {
        self.history.clear();
        self.follow_up_count = 0;
        self.touch();
    }

    /// History in the shape collaborators expect.
    pub fn history_messages(&self) -> Vec<HistoryMessage> {
        self.history.iter().map(Turn::to_history).collect()
    }
}

/// Session store shared by all request handlers.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    turn_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    persist_lock: Arc<Mutex<()>>,
    persist_path: Option<PathBuf>,
    idle_limit: Duration,
    max_follow_ups: u32,
}

/// Idle limit for `secs`, saturating where chrono cannot represent it.
fn idle_limit(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl SessionStore {
    /// Create an in-memory store.
    pub fn new(timeout_secs: u64, max_follow_ups: u32) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            turn_locks: Arc::new(Mutex::new(HashMap::new())),
            persist_lock: Arc::new(Mutex::new(())),
            persist_path: None,
            idle_limit: idle_limit(timeout_secs),
            max_follow_ups,
        }
    }

    /// Back the store with a JSON snapshot at `path`.
    ///
    /// Sessions already in the file are loaded; expired ones are dropped. A
    /// missing or unreadable file starts an empty store.
    pub async fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = load_snapshot(&path).await;
        let count = {
            let mut sessions = self.sessions.lock().await;
            for (id, mut session) in loaded {
                if session.is_expired(self.idle_limit) {
                    continue;
                }
                session.follow_up_count = session.follow_up_count.min(self.max_follow_ups);
                sessions.insert(id, session);
            }
            sessions.len()
        };
        tracing::info!(path = %path.display(), sessions = count, "Session store opened");
        self.persist_path = Some(path);
        self
    }

    pub fn max_follow_ups(&self) -> u32 {
        self.max_follow_ups
    }

    pub fn idle_limit(&self) -> Duration {
        self.idle_limit
    }

    /// Number of stored sessions, including idle ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serialise exchanges on one session. Hold the guard for the whole turn.
    pub async fn lock_turn(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Get a live session. Expired sessions are evicted and never returned.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let (session, evicted) = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(id) {
                Some(s) if s.is_expired(self.idle_limit) => {
                    sessions.remove(id);
                    (None, true)
                }
                Some(s) => (Some(s.clone()), false),
                None => (None, false),
            }
        };
        if evicted {
            tracing::debug!(session_id = %id, "Evicted idle session on lookup");
            self.persist().await;
        }
        session
    }

    /// Get a live session, creating a fresh one if it is missing or expired.
    ///
    /// Creating a session first purges every idle one.
    pub async fn get_or_create(&self, id: &str) -> Session {
        let live = self.get(id).await.is_some();
        if !live {
            self.purge_expired().await;
        }

        let session = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .entry(id.to_string())
                .or_insert_with(|| Session::new(id));
            session.touch();
            session.clone()
        };
        if !live {
            tracing::info!(session_id = %id, "Session created");
            self.persist().await;
        }
        session
    }

    /// Append a completed exchange. A follow-up exchange bumps the counter,
    /// which saturates at the configured maximum.
    pub async fn commit_exchange(
        &self,
        id: &str,
        user: Turn,
        assistant: Turn,
        follow_up: bool,
    ) -> Session {
        let session = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .entry(id.to_string())
                .or_insert_with(|| Session::new(id));
            session.history.push(user);
            session.history.push(assistant);
            if follow_up && session.follow_up_count < self.max_follow_ups {
                session.follow_up_count += 1;
            }
            session.touch();
            session.clone()
        };
        self.persist().await;
        session
    }

    /// Clear a live session's history. Returns `false` for unknown or expired ids.
    pub async fn reset(&self, id: &str) -> bool {
        let cleared = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(id) {
                Some(s) if s.is_expired(self.idle_limit) => {
                    sessions.remove(id);
                    false
                }
                Some(s) => {
                    s.clear();
                    true
                }
                None => return false,
            }
        };
        self.persist().await;
        cleared
    }

    /// Evict all idle sessions. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let (removed, live): (usize, HashSet<String>) = {
            let mut sessions = self.sessions.lock().await;
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_expired(self.idle_limit));
            (before - sessions.len(), sessions.keys().cloned().collect())
        };

        {
            let mut locks = self.turn_locks.lock().await;
            locks.retain(|id, lock| live.contains(id) || Arc::strong_count(lock) > 1);
        }

        if removed > 0 {
            tracing::info!(removed, "Purged idle sessions");
            self.persist().await;
        }
        removed
    }

    /// Write the current snapshot. Failures are logged, not returned.
    async fn persist(&self) {
        let Some(ref path) = self.persist_path else {
            return;
        };

        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let sessions = self.sessions.lock().await;
            let ordered: BTreeMap<&String, &Session> = sessions.iter().collect();
            serde_json::to_string_pretty(&ordered)
        };

        let result = match snapshot {
            Ok(json) => write_atomic(path, json.as_bytes()).await,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist sessions");
        }
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, session: Session) {
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session);
    }
}

async fn load_snapshot(path: &Path) -> HashMap<String, Session> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read session store");
            return HashMap::new();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Corrupt session store, starting empty");
        HashMap::new()
    })
}

async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}
