use crate::channels::email::EmailChannel;
use crate::channels::slack::SlackChannel;
use crate::channels::webhook::WebhookChannel;
use crate::rate_limit::TokenBucket;
use crate::{NotificationChannel, NotificationConfig};
use anyhow::Result;
use apiwatch_common::types::Alert;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing;

const BURST: f64 = 3.0;

/// Renders and dispatches alerts to the configured channels, one token
/// bucket per alert source.
pub struct NotificationManager {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
    limiters: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    rate: f64,
}

impl NotificationManager {
    pub fn new(config: NotificationConfig) -> Result<Self> {
        let mut channels: HashMap<String, Arc<dyn NotificationChannel>> = HashMap::new();

        if let Some(email) = &config.email {
            let channel = EmailChannel::new(email, config.defaults.recipients.clone())?;
            channels.insert("email".to_string(), Arc::new(channel));
        }
        if let Some(slack) = &config.slack {
            channels.insert("slack".to_string(), Arc::new(SlackChannel::new(slack)));
        }
        if let Some(webhook) = &config.webhook {
            channels.insert(
                "webhook".to_string(),
                Arc::new(WebhookChannel::new(webhook)),
            );
        }

        tracing::info!(
            channels = ?channels.keys().collect::<Vec<_>>(),
            min_interval_secs = config.defaults.min_interval_secs,
            "Notification manager ready"
        );

        Ok(Self {
            channels,
            limiters: RwLock::new(HashMap::new()),
            rate: 1.0 / config.defaults.min_interval_secs.max(1) as f64,
        })
    }

    /// Dispatches `alert` to each named channel concurrently.
    ///
    /// When the source's token bucket is empty the call succeeds without
    /// sending (cooldown dedup upstream makes delivery at-least-once, not
    /// exactly-once). The returned error aggregates every failed channel;
    /// one failure does not stop the others.
    pub async fn send(&self, alert: &Alert, channels: &[String]) -> Result<()> {
        if !self.acquire_token(&alert.source) {
            tracing::info!(
                alert_id = %alert.id,
                source = %alert.source,
                "Notification suppressed (rate limit)"
            );
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        let mut errors: Vec<String> = Vec::new();

        for name in channels {
            match self.channels.get(name) {
                Some(channel) => {
                    let channel = channel.clone();
                    let alert = alert.clone();
                    tasks.spawn(async move {
                        let kind = channel.channel_type();
                        channel.send(&alert).await.map_err(|e| {
                            tracing::error!(
                                channel = kind,
                                alert_id = %alert.id,
                                error = %e,
                                "Notification channel failed"
                            );
                            format!("{kind}: {e}")
                        })
                    });
                }
                None => errors.push(format!("{name}: unsupported notification channel")),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(format!("channel task panicked: {e}")),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("notification errors: {}", errors.join("; "))
        }
    }

    /// Finds or creates the source's limiter under the outer lock, then
    /// consumes a token under the limiter's own lock.
    fn acquire_token(&self, source: &str) -> bool {
        let limiter = {
            let limiters = self.limiters.read().unwrap_or_else(|p| p.into_inner());
            limiters.get(source).cloned()
        };

        let limiter = match limiter {
            Some(limiter) => limiter,
            None => {
                let mut limiters = self.limiters.write().unwrap_or_else(|p| p.into_inner());
                limiters
                    .entry(source.to_string())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(TokenBucket::new(self.rate, BURST)))
                    })
                    .clone()
            }
        };

        let mut bucket = limiter.lock().unwrap_or_else(|p| p.into_inner());
        bucket.try_acquire()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.keys().map(|s| s.as_str()).collect()
    }
}
