//! Persistence layer behind the observation pipeline.
//!
//! The core components consume the narrow traits defined here; the default
//! implementation ([`engine::SqliteStorage`]) keeps everything in a single
//! SQLite database with WAL mode. Swapping the backend means implementing
//! these traits, nothing more.

pub mod engine;
pub mod error;


use anyhow::Result;
use apiwatch_common::types::{
    Alert, AnalysisEvent, ApplicationLog, MonitoringTarget, ProbeResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Filtered, paginated query over stored application logs.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub application_id: Option<String>,
    pub service_name: Option<String>,
    pub severity: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LogQueryResult {
    pub logs: Vec<ApplicationLog>,
    pub total_count: u64,
    pub has_more: bool,
}

/// Aggregate health of one monitoring target over a time window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProbeSummary {
    pub target_id: String,
    pub total_checks: u64,
    pub success_count: u64,
    pub uptime_percent: f64,
    pub avg_response_time: f64,
    pub last_status_code: Option<u16>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Log persistence consumed by the ingester and the analyzer.
///
/// `batch_insert_logs` is atomic per batch: either every log in the batch
/// is stored or none is, and an error means the caller may retry the whole
/// batch.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn batch_insert_logs(&self, logs: &[ApplicationLog]) -> Result<()>;

    /// Returns logs whose timestamp falls within the trailing `window`.
    async fn get_recent_logs(&self, window: Duration) -> Result<Vec<ApplicationLog>>;

    async fn query_logs(&self, query: &LogQuery) -> Result<LogQueryResult>;
}

/// Probe result persistence consumed by the scheduler and the read API.
#[async_trait]
pub trait ProbeStore: Send + Sync {
    async fn save_probe_result(&self, result: &ProbeResult) -> Result<()>;

    /// Most recent results for a target, newest first.
    async fn list_probe_results(&self, target_id: &str, limit: usize)
        -> Result<Vec<ProbeResult>>;

    async fn probe_summary(&self, target_id: &str, window: Duration) -> Result<ProbeSummary>;
}

/// Monitoring target registry; targets are created and updated by the
/// admin API and loaded by the scheduler at startup.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn save_target(&self, target: &MonitoringTarget) -> Result<()>;

    async fn list_targets(&self) -> Result<Vec<MonitoringTarget>>;

    async fn delete_target(&self, id: &str) -> Result<bool>;
}

/// Analysis persistence consumed by the analyzer and the read API.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save_analysis(&self, analysis: &AnalysisEvent) -> Result<()>;

    /// Analyses of the given kind, newest first. `kind = None` returns all.
    async fn list_analyses(&self, kind: Option<&str>, limit: usize)
        -> Result<Vec<AnalysisEvent>>;
}

/// Alert persistence consumed by the alert manager.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn save_alert(&self, alert: &Alert) -> Result<()>;

    async fn update_alert(&self, alert: &Alert) -> Result<()>;

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>>;

    async fn get_active_alerts(&self) -> Result<Vec<Alert>>;
}
