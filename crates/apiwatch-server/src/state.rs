use crate::metrics::Metrics;
use apiwatch_alert::correlation::CorrelationEngine;
use apiwatch_alert::manager::AlertManager;
use apiwatch_analysis::analyzer::Analyzer;
use apiwatch_ingest::Ingester;
use apiwatch_probe::scheduler::ProbeScheduler;
use apiwatch_storage::engine::SqliteStorage;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<SqliteStorage>,
    pub ingester: Arc<Ingester>,
    pub analyzer: Arc<Analyzer>,
    pub alert_manager: Arc<AlertManager>,
    pub correlation: Arc<CorrelationEngine>,
    pub scheduler: Arc<ProbeScheduler>,
    pub metrics: Arc<Metrics>,
    pub start_time: DateTime<Utc>,
}
