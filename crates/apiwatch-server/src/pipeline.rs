//! Glue between the pipeline components: probe results and analysis events
//! flow into the alert manager, and created alerts fan out through the
//! notification manager.

use crate::metrics::Metrics;
use anyhow::Result;
use apiwatch_alert::manager::AlertManager;
use apiwatch_alert::Notifier;
use apiwatch_analysis::analyzer::AnalysisSink;
use apiwatch_common::types::{Alert, AnalysisEvent, ProbeResult};
use apiwatch_notify::manager::NotificationManager;
use apiwatch_probe::ProbeSink;
use async_trait::async_trait;
use std::sync::Arc;
use tracing;

/// Forwards every probe result to the alert manager.
pub struct ProbeAlertSink {
    manager: Arc<AlertManager>,
    metrics: Arc<Metrics>,
}

impl ProbeAlertSink {
    pub fn new(manager: Arc<AlertManager>, metrics: Arc<Metrics>) -> Self {
        Self { manager, metrics }
    }
}

#[async_trait]
impl ProbeSink for ProbeAlertSink {
    async fn publish(&self, result: &ProbeResult) {
        self.metrics.probes_total.inc();
        if !result.success {
            self.metrics.probe_failures_total.inc();
        }

        match self.manager.process_probe_result(result).await {
            Ok(created) => {
                self.metrics.alerts_created_total.inc_by(created.len() as u64);
            }
            Err(e) => {
                tracing::error!(
                    target_id = %result.target_id,
                    error = %e,
                    "Alert evaluation failed for probe result"
                );
            }
        }
    }
}

/// Forwards every analysis event to the alert manager.
pub struct AnalysisAlertSink {
    manager: Arc<AlertManager>,
    metrics: Arc<Metrics>,
}

impl AnalysisAlertSink {
    pub fn new(manager: Arc<AlertManager>, metrics: Arc<Metrics>) -> Self {
        Self { manager, metrics }
    }
}

#[async_trait]
impl AnalysisSink for AnalysisAlertSink {
    async fn publish(&self, event: &AnalysisEvent) {
        self.metrics.analyses_total.inc();

        match self.manager.process_analysis(event).await {
            Ok(created) => {
                self.metrics.alerts_created_total.inc_by(created.len() as u64);
            }
            Err(e) => {
                tracing::error!(
                    analysis_id = %event.id,
                    error = %e,
                    "Alert evaluation failed for analysis event"
                );
            }
        }
    }
}

/// Dispatches created alerts to the configured default channels.
pub struct ChannelNotifier {
    manager: Arc<NotificationManager>,
    channels: Vec<String>,
}

impl ChannelNotifier {
    pub fn new(manager: Arc<NotificationManager>, channels: Vec<String>) -> Self {
        Self { manager, channels }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.manager.send(alert, &self.channels).await
    }
}
