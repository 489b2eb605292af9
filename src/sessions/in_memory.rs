//! In-memory session store implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{SessionStore, ThreadKey, ThreadSession};

/// An in-memory session store backed by a mutex-protected hash map.
///
/// Sessions live only for the lifetime of the process; there is no
/// persistence across restarts.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<ThreadKey, ThreadSession>>,
    expiry: Duration,
}

impl InMemorySessionStore {
    pub fn new(expiry: std::time::Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            expiry: Duration::from_std(expiry).unwrap_or_else(|_| Duration::hours(24)),
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, channel: &str, root_ts: &str, age: Duration) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&ThreadKey::new(channel, root_ts)) {
            session.last_activity = Utc::now() - age;
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn resolve(&self, channel: &str, thread_ts: Option<&str>) -> Result<Option<String>> {
        let Some(thread_ts) = thread_ts else {
            return Ok(None);
        };

        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&ThreadKey::new(channel, thread_ts)) {
            Some(session) => {
                session.last_activity = Utc::now();
                Ok(Some(session.session_id.clone()))
            }
            None => Ok(None),
        }
    }

    async fn record(&self, channel: &str, root_ts: &str, session_id: &str) -> Result<()> {
        let now = Utc::now();
        let session = ThreadSession {
            session_id: session_id.to_string(),
            created_at: now,
            last_activity: now,
        };

        let mut sessions = self.sessions.lock();
        sessions.insert(ThreadKey::new(channel, root_ts), session);
        Ok(())
    }

    async fn remove(&self, channel: &str, thread_ts: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock();
        Ok(sessions.remove(&ThreadKey::new(channel, thread_ts)).is_some())
    }

    async fn inspect(&self, channel: &str, thread_ts: &str) -> Result<Option<ThreadSession>> {
        let sessions = self.sessions.lock();
        Ok(sessions.get(&ThreadKey::new(channel, thread_ts)).cloned())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.expiry;
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity >= cutoff);
        Ok(before - sessions.len())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.sessions.lock().len())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
