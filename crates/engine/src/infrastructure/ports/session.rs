//! Server-side session storage port.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Key-value data held for one browser session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionData {
    values: Map<String, Value>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Explicit load/persist/destroy boundaries for session data.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Data for `id`, or `None` when unknown or expired.
    async fn load(&self, id: &str) -> Option<SessionData>;

    /// Writes `data` under `id`, refreshing its expiry.
    async fn persist(&self, id: &str, data: &SessionData);

    async fn destroy(&self, id: &str);

    /// A new unguessable session id.
    fn new_id(&self) -> String;
}
