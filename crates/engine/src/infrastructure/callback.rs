//! HTTP callbacks to in-world objects.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::infrastructure::ports::{CallbackPort, CallbackRequest};

/// One initial attempt plus one retry.
const MAX_ATTEMPTS: u32 = 2;

/// Posts JSON to per-player callback URLs.
#[derive(Clone)]
pub struct HttpCallbackClient {
    client: Client,
}

impl HttpCallbackClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    async fn attempt(&self, request: &CallbackRequest) -> Result<(), String> {
        let response = self
            .client
            .post(&request.url)
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {status}"));
        }

        if let Some(expected) = &request.expect {
            let body = response.text().await.map_err(|e| e.to_string())?;
            if !body.contains(expected.as_str()) {
                return Err(format!("response did not contain {expected:?}"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CallbackPort for HttpCallbackClient {
    async fn deliver(&self, request: CallbackRequest) -> bool {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&request).await {
                Ok(()) => {
                    tracing::debug!(url = %request.url, attempt, "Callback delivered");
                    return true;
                }
                Err(error) => {
                    tracing::warn!(url = %request.url, attempt, error = %error, "Callback failed");
                }
            }
        }
        false
    }
}
