use anyhow::Result;
use apiwatch_common::duration::parse_duration;
use apiwatch_notify::{
    DefaultsConfig, EmailConfig, NotificationConfig, SlackConfig, WebhookConfig,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Server configuration, read from environment variables
/// (`SERVER_PORT`, `DB_PATH`, `SMTP_HOST`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_monitoring_timeout")]
    pub monitoring_default_timeout: String,
    #[serde(default = "default_monitoring_frequency")]
    pub monitoring_default_frequency: String,

    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
    #[serde(default = "default_ai_analysis_batch_size")]
    pub ai_analysis_batch_size: usize,
    /// Analyzer cycle interval, duration string.
    #[serde(default = "default_ai_analysis_interval")]
    pub ai_analysis_interval: String,

    /// Comma-separated channel names alerts are fanned out to.
    #[serde(default = "default_alert_channel")]
    pub alert_default_channel: String,
    #[serde(default = "default_notify_min_interval")]
    pub notify_min_interval: String,

    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub smtp_from: Option<String>,
    /// Comma-separated default recipient addresses.
    #[serde(default)]
    pub smtp_recipients: Option<String>,

    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    /// Comma-separated webhook URLs.
    #[serde(default)]
    pub webhook_urls: Option<String>,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "data/apiwatch.db".to_string()
}

fn default_monitoring_timeout() -> String {
    "30s".to_string()
}

fn default_monitoring_frequency() -> String {
    "*/30 * * * * *".to_string()
}

fn default_log_retention_days() -> u32 {
    30
}

fn default_ai_analysis_batch_size() -> usize {
    500
}

fn default_ai_analysis_interval() -> String {
    "5m".to_string()
}

fn default_alert_channel() -> String {
    "email".to_string()
}

fn default_notify_min_interval() -> String {
    "60s".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;
        config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))
    }

    pub fn analysis_interval(&self) -> Duration {
        parse_duration(&self.ai_analysis_interval).unwrap_or(Duration::from_secs(300))
    }

    pub fn notify_min_interval(&self) -> Duration {
        parse_duration(&self.notify_min_interval).unwrap_or(Duration::from_secs(60))
    }

    /// Channels every created alert is dispatched to.
    pub fn default_channels(&self) -> Vec<String> {
        split_csv(&self.alert_default_channel)
    }

    pub fn notification_config(&self) -> NotificationConfig {
        let email = match (&self.smtp_host, &self.smtp_from) {
            (Some(host), Some(from)) => Some(EmailConfig {
                host: host.clone(),
                port: self.smtp_port,
                username: self.smtp_username.clone().unwrap_or_default(),
                password: self.smtp_password.clone().unwrap_or_default(),
                from: from.clone(),
            }),
            _ => None,
        };

        let slack = self.slack_webhook_url.as_ref().map(|url| SlackConfig {
            webhook_url: url.clone(),
            channel: None,
        });

        let webhook = self.webhook_urls.as_ref().map(|urls| {
            let urls: HashMap<String, String> = split_csv(urls)
                .into_iter()
                .enumerate()
                .map(|(i, url)| (format!("webhook-{i}"), url))
                .collect();
            WebhookConfig { urls }
        });

        NotificationConfig {
            email,
            slack,
            webhook,
            defaults: DefaultsConfig {
                min_interval_secs: self.notify_min_interval().as_secs().max(1),
                recipients: self
                    .smtp_recipients
                    .as_deref()
                    .map(split_csv)
                    .unwrap_or_default(),
            },
        }
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
