use crate::{NotificationChannel, WebhookConfig};
use anyhow::Result;
use apiwatch_common::types::Alert;
use async_trait::async_trait;
use std::collections::HashMap;

pub struct WebhookChannel {
    client: reqwest::Client,
    urls: HashMap<String, String>,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            urls: config.urls.clone(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        for (name, url) in &self.urls {
            let response = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(alert)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("webhook {name}: {e}"))?;

            let status = response.status();
            if status.as_u16() >= 400 {
                anyhow::bail!("webhook {name} returned status {status}");
            }
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }
}
