//! In-memory session store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;

use crate::infrastructure::ports::{ClockPort, SessionData, SessionStore};

struct Entry {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// Session data kept in process memory, expiring after a fixed TTL.
pub struct InMemorySessionStore {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    clock: Arc<dyn ClockPort>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &str) -> Option<SessionData> {
        let now = self.clock.now();
        let expired = match self.entries.get(id) {
            None => return None,
            Some(entry) if entry.expires_at > now => return Some(entry.data.clone()),
            Some(_) => true,
        };
        if expired {
            self.entries.remove(id);
        }
        None
    }

    async fn persist(&self, id: &str, data: &SessionData) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.insert(
            id.to_string(),
            Entry {
                data: data.clone(),
                expires_at,
            },
        );
    }

    async fn destroy(&self, id: &str) {
        self.entries.remove(id);
    }

    fn new_id(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
