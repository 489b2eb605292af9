//! Session storage traits and types for thread-scoped conversation state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite key identifying one conversation thread: the channel id plus
/// the timestamp of the thread's root message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub channel: String,
    pub root_ts: String,
}

impl ThreadKey {
    pub fn new(channel: &str, root_ts: &str) -> Self {
        Self {
            channel: channel.to_string(),
            root_ts: root_ts.to_string(),
        }
    }
}

/// Remote conversation state tracked for one thread.
///
/// Session identity is thread-scoped, not user-scoped: the remote agent's
/// continuity model is per-conversation, so multiple users replying in the
/// same thread share one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSession {
    /// Opaque token issued by the remote agent API.
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Storage for per-thread remote agent sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve the session id for an inbound message. A message without a
    /// thread timestamp starts a new conversation and always resolves to
    /// `None`. A hit refreshes `last_activity`; a miss (orphaned thread)
    /// also resolves to `None` and starts fresh.
    async fn resolve(&self, channel: &str, thread_ts: Option<&str>) -> Result<Option<String>>;

    /// Insert or overwrite the session for a thread root. Called only for
    /// the root message of a new thread, once the remote API has returned
    /// a usable session id.
    async fn record(&self, channel: &str, root_ts: &str, session_id: &str) -> Result<()>;

    /// Delete the session for a thread. Returns whether one existed.
    async fn remove(&self, channel: &str, thread_ts: &str) -> Result<bool>;

    /// Snapshot the session for a thread without refreshing `last_activity`.
    async fn inspect(&self, channel: &str, thread_ts: &str) -> Result<Option<ThreadSession>>;

    /// Remove every session idle strictly longer than the expiry threshold.
    /// Returns the number of sessions removed.
    async fn sweep_expired(&self) -> Result<usize>;

    /// Current session count, for diagnostics.
    async fn size(&self) -> Result<usize>;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
