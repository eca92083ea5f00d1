//! Alert notification delivery.
//!
//! The [`manager::NotificationManager`] fans an alert out to the requested
//! [`NotificationChannel`]s concurrently, behind a per-source token-bucket
//! rate limiter. Built-in channels cover email (SMTP), Slack and generic
//! webhooks.

pub mod channels;
pub mod manager;
pub mod rate_limit;
pub mod template;


use anyhow::Result;
use apiwatch_common::types::Alert;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// A delivery channel that sends an alert to an external service.
///
/// Implementations are constructed from [`NotificationConfig`] by the
/// manager and dispatched concurrently; an error from one channel never
/// aborts its siblings.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers the alert.
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream service rejects or cannot be
    /// reached; the caller aggregates per-channel failures.
    async fn send(&self, alert: &Alert) -> Result<()>;

    /// Channel type name (`"email"`, `"slack"`, `"webhook"`).
    fn channel_type(&self) -> &str;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// name -> URL
    pub urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    /// Minimum interval between notifications for one source; the token
    /// bucket refills at `1 / min_interval_secs` tokens per second.
    pub min_interval_secs: u64,
    pub recipients: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 60,
            recipients: Vec::new(),
        }
    }
}
