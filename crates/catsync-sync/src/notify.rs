use std::time::Duration;

use async_trait::async_trait;
use catsync_core::{NotificationSink, NotifyError};
use serde::Serialize;

/// Writes run summaries to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(summary = %text, "catalog sync notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` to a chat webhook (Slack, Mattermost, Discord
/// compatible).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { text })
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError(format!("webhook responded with HTTP {status}")));
        }
        Ok(())
    }
}
