use crate::template::slack_blocks;
use crate::{NotificationChannel, SlackConfig};
use anyhow::Result;
use apiwatch_common::types::Alert;
use async_trait::async_trait;

pub struct SlackChannel {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackChannel {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.webhook_url.clone(),
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = slack_blocks(alert);
        let response = self
            .client
            .post(&self.webhook_url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            anyhow::bail!("slack webhook returned status {status}");
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "slack"
    }
}
