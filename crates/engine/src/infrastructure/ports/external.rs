//! Outbound callback port.

use async_trait::async_trait;
use serde_json::Value;

/// A best-effort POST to a player's in-world object.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackRequest {
    pub url: String,
    pub payload: Value,
    /// When set, the response body must contain this text to count as delivered.
    pub expect: Option<String>,
}

impl CallbackRequest {
    pub fn new(url: impl Into<String>, payload: Value) -> Self {
        Self {
            url: url.into(),
            payload,
            expect: None,
        }
    }

    pub fn expecting(mut self, text: impl Into<String>) -> Self {
        self.expect = Some(text.into());
        self
    }
}

/// Delivers callbacks. Never fails; delivery is reported as a boolean.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallbackPort: Send + Sync {
    async fn deliver(&self, request: CallbackRequest) -> bool;
}
