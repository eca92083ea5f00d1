use crate::anomaly::{AnomalyDetector, DetectorConfig, TimeSeriesPoint};
use crate::pattern::extract_pattern;
use apiwatch_common::types::{
    AnalysisEvent, AnalysisKind, AnalysisStatus, ApplicationLog, LogSeverity,
};
use apiwatch_storage::{AnalysisStore, LogStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing;

/// Receives analysis events as they are produced; implemented by the alert
/// layer.
#[async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn publish(&self, event: &AnalysisEvent);
}

const BASELINE_WINDOW: usize = 60;
const ANALYSIS_LOOKBACK: Duration = Duration::from_secs(24 * 3600);
const CYCLE_TIMEOUT: Duration = Duration::from_secs(300);
const PATTERN_MIN_COUNT: usize = 3;
const PATTERN_MAX_EXAMPLES: usize = 5;

fn baseline_freshness() -> ChronoDuration {
    ChronoDuration::hours(1)
}

/// Rolling error-rate baseline for one (application, service) stream.
#[derive(Debug)]
struct Baseline {
    error_rates: VecDeque<f64>,
    updated_at: DateTime<Utc>,
}

impl Baseline {
    fn push(&mut self, rate: f64) {
        self.error_rates.push_back(rate);
        while self.error_rates.len() > BASELINE_WINDOW {
            self.error_rates.pop_front();
        }
        self.updated_at = Utc::now();
    }

    fn mean_stddev(&self) -> (f64, f64) {
        let values: Vec<f64> = self.error_rates.iter().copied().collect();
        crate::anomaly::mean_stddev(&values)
    }
}

struct PatternCluster {
    pattern: String,
    count: usize,
    last_seen: DateTime<Utc>,
    examples: Vec<String>,
    severities: HashMap<String, usize>,
}

/// Periodic log analyzer: keeps per-stream baselines, flags error-rate
/// anomalies and recurring error patterns, and persists what it finds.
pub struct Analyzer {
    logs: Arc<dyn LogStore>,
    analyses: Arc<dyn AnalysisStore>,
    sink: Arc<dyn AnalysisSink>,
    baselines: Mutex<HashMap<String, Baseline>>,
    update_interval: Duration,
    detector: AnomalyDetector,
}

impl Analyzer {
    pub fn new(
        logs: Arc<dyn LogStore>,
        analyses: Arc<dyn AnalysisStore>,
        sink: Arc<dyn AnalysisSink>,
        update_interval: Duration,
    ) -> Self {
        Self {
            logs,
            analyses,
            sink,
            baselines: Mutex::new(HashMap::new()),
            update_interval,
            detector: AnomalyDetector::new(DetectorConfig::default()),
        }
    }

    /// Background loop; one analysis cycle per tick, bounded by the cycle
    /// timeout. Storage errors are swallowed and retried next cycle.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.update_interval.as_secs(),
            "Analyzer started"
        );
        let mut tick = tokio::time::interval(self.update_interval);
        tick.tick().await;
        loop {
            tick.tick().await;
            if tokio::time::timeout(CYCLE_TIMEOUT, self.analyze())
                .await
                .is_err()
            {
                tracing::error!("Analysis cycle timed out");
            }
        }
    }

    /// One analysis cycle over the last 24 hours of logs.
    pub async fn analyze(&self) {
        let logs = match self.logs.get_recent_logs(ANALYSIS_LOOKBACK).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load recent logs, retrying next cycle");
                return;
            }
        };
        if logs.is_empty() {
            return;
        }

        let groups = group_logs(&logs);
        for (key, group) in groups {
            let rate_anomaly = self.update_baseline_and_detect(&key, &group).await;
            if let Some(event) = rate_anomaly {
                self.emit(event).await;
            }

            for event in error_pattern_events(&group) {
                self.emit(event).await;
            }
        }
    }

    /// Ensemble detection over a numeric stream (e.g. probe latencies);
    /// returns one `latency_anomaly` event per anomalous point.
    pub fn detect_latency_anomalies(
        &self,
        source: &str,
        points: &[TimeSeriesPoint],
    ) -> Vec<AnalysisEvent> {
        self.detector
            .detect(points)
            .iter()
            .zip(points)
            .filter(|(result, _)| result.is_anomaly)
            .map(|(result, point)| AnalysisEvent {
                id: apiwatch_common::id::next_id(),
                kind: AnalysisKind::LatencyAnomaly,
                severity: "high".to_string(),
                description: format!("Latency anomaly detected for {source}"),
                details: serde_json::json!({
                    "source": source,
                    "value": point.value,
                    "score": result.score,
                    "expected_lower": result.expected_range.lower,
                    "expected_upper": result.expected_range.upper,
                    "timestamp": point.timestamp.to_rfc3339(),
                }),
                detected_at: Utc::now(),
                status: AnalysisStatus::Active,
            })
            .collect()
    }

    async fn update_baseline_and_detect(
        &self,
        key: &str,
        logs: &[&ApplicationLog],
    ) -> Option<AnalysisEvent> {
        let error_count = logs
            .iter()
            .filter(|l| l.severity == LogSeverity::Error)
            .count();
        let current_rate = error_count as f64 / logs.len() as f64;

        let mut baselines = self.baselines.lock().await;
        let baseline = baselines.entry(key.to_string()).or_insert_with(|| Baseline {
            error_rates: VecDeque::new(),
            updated_at: Utc::now(),
        });
        baseline.push(current_rate);

        if Utc::now() - baseline.updated_at > baseline_freshness() {
            return None;
        }

        let (mean, stddev) = baseline.mean_stddev();
        if stddev <= f64::EPSILON || current_rate <= mean + 2.0 * stddev {
            return None;
        }

        tracing::warn!(
            stream = key,
            current_rate,
            baseline_mean = mean,
            "Error rate anomaly detected"
        );

        Some(AnalysisEvent {
            id: apiwatch_common::id::next_id(),
            kind: AnalysisKind::ErrorRateAnomaly,
            severity: "high".to_string(),
            description: "Abnormal increase in error rate detected".to_string(),
            details: serde_json::json!({
                "stream": key,
                "current_rate": current_rate,
                "baseline_mean": mean,
                "baseline_stddev": stddev,
            }),
            detected_at: Utc::now(),
            status: AnalysisStatus::Active,
        })
    }

    async fn emit(&self, event: AnalysisEvent) {
        if let Err(e) = self.analyses.save_analysis(&event).await {
            tracing::error!(analysis_id = %event.id, error = %e, "Failed to persist analysis");
        }
        self.sink.publish(&event).await;
    }
}

fn group_logs<'a>(logs: &'a [ApplicationLog]) -> HashMap<String, Vec<&'a ApplicationLog>> {
    let mut groups: HashMap<String, Vec<&ApplicationLog>> = HashMap::new();
    for log in logs {
        let key = format!("{}:{}", log.application_id, log.service_name);
        groups.entry(key).or_default().push(log);
    }
    groups
}

/// Clusters ERROR logs by normalized message pattern and reports every
/// cluster that recurs at least `PATTERN_MIN_COUNT` times.
pub(crate) fn error_pattern_events(logs: &[&ApplicationLog]) -> Vec<AnalysisEvent> {
    let mut clusters: HashMap<String, PatternCluster> = HashMap::new();

    for log in logs
        .iter()
        .filter(|l| l.severity == LogSeverity::Error)
    {
        let pattern = extract_pattern(&log.message);
        let timestamp = log.timestamp.unwrap_or_else(Utc::now);
        let cluster = clusters
            .entry(pattern.clone())
            .or_insert_with(|| PatternCluster {
                pattern,
                count: 0,
                last_seen: timestamp,
                examples: Vec::new(),
                severities: HashMap::new(),
            });

        cluster.count += 1;
        if timestamp > cluster.last_seen {
            cluster.last_seen = timestamp;
        }
        if cluster.examples.len() < PATTERN_MAX_EXAMPLES {
            cluster.examples.push(log.message.clone());
        }
        *cluster
            .severities
            .entry(log.severity.to_string())
            .or_insert(0) += 1;
    }

    clusters
        .into_values()
        .filter(|c| c.count >= PATTERN_MIN_COUNT)
        .map(|cluster| {
            let severity = cluster
                .severities
                .iter()
                .max_by_key(|(_, count)| **count)
                .map(|(severity, _)| severity.clone())
                .unwrap_or_else(|| LogSeverity::Error.to_string());
            AnalysisEvent {
                id: apiwatch_common::id::next_id(),
                kind: AnalysisKind::ErrorPattern,
                severity,
                description: "Recurring error pattern detected".to_string(),
                details: serde_json::json!({
                    "pattern": cluster.pattern,
                    "count": cluster.count,
                    "examples": cluster.examples,
                }),
                detected_at: cluster.last_seen,
                status: AnalysisStatus::Active,
            }
        })
        .collect()
}
