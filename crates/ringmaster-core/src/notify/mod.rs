//! Notifier sinks for scheduled-job results.
//!
//! Both sinks are optional collaborators: the scheduler sends a message on
//! non-dry-run success when the job carries a `slack_channel_id` /
//! `teams_webhook_url`, and swallows (logs) any send failure so that a
//! broken webhook can never change a recorded job status.

use async_trait::async_trait;
use serde_json::json;

/// Posts a message to a Slack channel by id.
#[async_trait]
pub trait SlackMessageSender: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), String>;
}

/// Posts a message to a Microsoft Teams incoming webhook.
#[async_trait]
pub trait TeamsMessageSender: Send + Sync {
    async fn send(&self, webhook_url: &str, text: &str) -> Result<(), String>;
}

/// Default [`TeamsMessageSender`] posting `{"text": …}` JSON to the webhook.
pub struct WebhookTeamsSender {
    client: reqwest::Client,
}

impl WebhookTeamsSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookTeamsSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamsMessageSender for WebhookTeamsSender {
    async fn send(&self, webhook_url: &str, text: &str) -> Result<(), String> {
        let response = self
            .client
            .post(webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| format!("teams webhook request failed: {e}"))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("teams webhook returned {}", response.status()))
        }
    }
}
