use crate::analyzer::{error_pattern_events, AnalysisSink, Analyzer};
use crate::anomaly::{AnomalyDetector, DetectorConfig, TimeSeriesPoint};
use crate::clustering::{cosine_distance, tokenize, Dbscan, TfidfVectorizer};
use anyhow::Result;
use apiwatch_common::types::{AnalysisEvent, AnalysisKind, ApplicationLog, LogSeverity};
use apiwatch_storage::{AnalysisStore, LogQuery, LogQueryResult, LogStore};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn series(values: &[f64]) -> Vec<TimeSeriesPoint> {
    let start = Utc::now() - ChronoDuration::minutes(values.len() as i64);
    values
        .iter()
        .enumerate()
        .map(|(i, v)| TimeSeriesPoint {
            timestamp: start + ChronoDuration::minutes(i as i64),
            value: *v,
        })
        .collect()
}

// ── Ensemble anomaly detection ──

#[test]
fn short_series_yields_zero_results() {
    let detector = AnomalyDetector::new(DetectorConfig::default());
    let results = detector.detect(&series(&[1.0, 2.0, 3.0]));
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| !r.is_anomaly && r.score == 0.0));
}

#[test]
fn spike_in_stable_series_is_flagged() {
    let mut values: Vec<f64> = (0..60).map(|i| 10.0 + 0.2 * ((i % 5) as f64)).collect();
    values.push(60.0);
    let detector = AnomalyDetector::new(DetectorConfig {
        seasonal_period: 5,
        ..Default::default()
    });

    let results = detector.detect(&series(&values));
    let last = results.last().unwrap();
    assert!(last.is_anomaly, "spike score was {}", last.score);
    assert!(last.score > 1.0);
    // the steady stretch before the spike stays quiet
    assert!(!results[40].is_anomaly);
}

#[test]
fn statistical_expected_range_is_symmetric_around_mean() {
    let detector = AnomalyDetector::new(DetectorConfig::default());
    let values: Vec<f64> = (0..40).map(|i| (i as f64 * 0.7).sin() * 3.0 + 20.0).collect();
    let points = series(&values);

    let results = detector.statistical_detection(&points);
    for (i, result) in results.iter().enumerate().skip(3) {
        let method = result.expect("window large enough");
        let start = i.saturating_sub(20);
        let window: Vec<f64> = values[start..=i].to_vec();
        let (mean, _) = crate::anomaly::mean_stddev(&window);
        let mid = (method.result.expected_range.lower + method.result.expected_range.upper) / 2.0;
        assert!(
            (mid - mean).abs() < 1e-9,
            "range not centered on mean at {i}: mid={mid} mean={mean}"
        );
    }
}

#[test]
fn seasonal_detection_needs_two_periods() {
    let detector = AnomalyDetector::new(DetectorConfig {
        seasonal_period: 24,
        ..Default::default()
    });
    let points = series(&vec![1.0; 30]);
    assert!(detector
        .seasonal_detection(&points)
        .iter()
        .all(Option::is_none));
}

#[test]
fn seasonal_detection_flags_off_phase_values() {
    // Two-phase sawtooth with mild noise so the phase stddev is nonzero,
    // then a value far outside its phase.
    let mut values = Vec::new();
    for i in 0..40 {
        let base = if i % 2 == 0 { 10.0 } else { 50.0 };
        values.push(base + (i % 4) as f64 * 0.1);
    }
    values.push(200.0); // even index, phase mean ~10

    let detector = AnomalyDetector::new(DetectorConfig {
        seasonal_period: 2,
        ..Default::default()
    });
    let results = detector.seasonal_detection(&series(&values));
    let last = results.last().unwrap().expect("phase stats available");
    assert!(last.result.is_anomaly);
    assert!(last.result.score > 3.0);
}

#[test]
fn robust_detection_flags_extreme_outlier() {
    let mut values: Vec<f64> = (0..30).map(|i| 5.0 + (i % 3) as f64 * 0.3).collect();
    values.push(500.0);
    let detector = AnomalyDetector::new(DetectorConfig::default());

    let results = detector.robust_detection(&series(&values));
    let last = results.last().unwrap().expect("window available");
    assert!(last.result.is_anomaly);
    assert!((last.critical - 3.5).abs() < f64::EPSILON);
}

#[test]
fn constant_series_produces_no_anomalies() {
    let detector = AnomalyDetector::new(DetectorConfig::default());
    let results = detector.detect(&series(&vec![7.0; 50]));
    assert!(results.iter().all(|r| !r.is_anomaly));
}

// ── Clustering ──

#[test]
fn cosine_distance_bounds_and_identities() {
    let a = vec![1.0, 0.0];
    let b = vec![1.0, 0.0];
    let orthogonal = vec![0.0, 1.0];
    let opposite = vec![-1.0, 0.0];
    let zero = vec![0.0, 0.0];

    assert!((cosine_distance(&a, &b) - 0.0).abs() < 1e-12);
    assert!((cosine_distance(&a, &orthogonal) - 1.0).abs() < 1e-12);
    assert!((cosine_distance(&a, &opposite) - 2.0).abs() < 1e-12);
    assert!((cosine_distance(&a, &zero) - 1.0).abs() < 1e-12);

    // general bound check
    let c = vec![0.3, -0.8];
    let d = vec![-0.5, 0.2];
    let dist = cosine_distance(&c, &d);
    assert!((0.0..=2.0).contains(&dist));
}

#[test]
fn tokenize_drops_short_tokens_and_stop_words() {
    let tokens = tokenize("The connection to DB-7 failed: timeout in pool");
    assert_eq!(tokens, vec!["connection", "failed", "timeout", "pool"]);
}

#[test]
fn tfidf_scores_rare_terms_higher() {
    let docs = vec![
        "connection timeout database".to_string(),
        "connection refused database".to_string(),
        "connection timeout database".to_string(),
    ];
    let mut vectorizer = TfidfVectorizer::new();
    vectorizer.fit(&docs);

    let vector = vectorizer.transform("connection refused");
    let max = vector.iter().cloned().fold(f64::MIN, f64::max);
    assert!(max > 0.0, "rare term should carry weight");

    // "connection" appears in every doc: idf = ln(1) = 0
    let common_only = vectorizer.transform("connection");
    assert!(common_only.iter().all(|v| *v == 0.0));
}

#[test]
fn dbscan_separates_clusters_and_marks_noise() {
    let docs: Vec<String> = vec![
        "database connection timeout".into(),
        "database connection timeout again".into(),
        "database connection timeout persists".into(),
        "payment gateway rejected card".into(),
        "payment gateway rejected transaction".into(),
        "payment gateway rejected charge".into(),
        "totally unrelated kernel panic".into(),
    ];
    let mut vectorizer = TfidfVectorizer::new();
    vectorizer.fit(&docs);
    let vectors: Vec<Vec<f64>> = docs.iter().map(|d| vectorizer.transform(d)).collect();

    let labels = Dbscan::new(0.5, 2).fit(&vectors);

    assert_eq!(labels.len(), 7);
    assert_eq!(labels[0], labels[1]);
    assert_eq!(labels[1], labels[2]);
    assert_eq!(labels[3], labels[4]);
    assert_eq!(labels[4], labels[5]);
    assert_ne!(labels[0], labels[3]);
    assert!(labels[0] >= 1 && labels[3] >= 1, "cluster ids are 1-indexed");
    assert_eq!(labels[6], 0, "lone point is noise");
}

// ── Analyzer cycle ──

struct StubLogStore {
    logs: Vec<ApplicationLog>,
}

#[async_trait]
impl LogStore for StubLogStore {
    async fn batch_insert_logs(&self, _logs: &[ApplicationLog]) -> Result<()> {
        Ok(())
    }

    async fn get_recent_logs(&self, _window: Duration) -> Result<Vec<ApplicationLog>> {
        Ok(self.logs.clone())
    }

    async fn query_logs(&self, _query: &LogQuery) -> Result<LogQueryResult> {
        Ok(LogQueryResult {
            logs: vec![],
            total_count: 0,
            has_more: false,
        })
    }
}

#[derive(Default)]
struct CapturingAnalysisStore {
    saved: Mutex<Vec<AnalysisEvent>>,
}

#[async_trait]
impl AnalysisStore for CapturingAnalysisStore {
    async fn save_analysis(&self, analysis: &AnalysisEvent) -> Result<()> {
        self.saved.lock().unwrap().push(analysis.clone());
        Ok(())
    }

    async fn list_analyses(&self, _kind: Option<&str>, _limit: usize) -> Result<Vec<AnalysisEvent>> {
        Ok(self.saved.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct CapturingSink {
    published: Mutex<Vec<AnalysisEvent>>,
}

#[async_trait]
impl AnalysisSink for CapturingSink {
    async fn publish(&self, event: &AnalysisEvent) {
        self.published.lock().unwrap().push(event.clone());
    }
}

fn make_log(app: &str, svc: &str, severity: LogSeverity, message: &str) -> ApplicationLog {
    ApplicationLog {
        id: apiwatch_common::id::next_id(),
        application_id: app.into(),
        service_name: svc.into(),
        severity,
        message: message.into(),
        timestamp: Some(Utc::now()),
        instance_id: None,
        trace_id: None,
        user_id: None,
        source: None,
        payload: None,
    }
}

#[tokio::test]
async fn recurring_error_patterns_are_reported() {
    let mut logs = Vec::new();
    for i in 0..4 {
        logs.push(make_log(
            "app-1",
            "checkout",
            LogSeverity::Error,
            &format!("payment {i} failed for user {}", 100 + i),
        ));
    }
    logs.push(make_log("app-1", "checkout", LogSeverity::Info, "ok"));
    // a pattern below the significance threshold
    logs.push(make_log(
        "app-1",
        "checkout",
        LogSeverity::Error,
        "disk full on node 3",
    ));

    let store = Arc::new(CapturingAnalysisStore::default());
    let sink = Arc::new(CapturingSink::default());
    let analyzer = Analyzer::new(
        Arc::new(StubLogStore { logs }),
        store.clone(),
        sink.clone(),
        Duration::from_secs(60),
    );

    analyzer.analyze().await;

    let saved = store.saved.lock().unwrap();
    let patterns: Vec<&AnalysisEvent> = saved
        .iter()
        .filter(|e| e.kind == AnalysisKind::ErrorPattern)
        .collect();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].details["pattern"], "payment N failed for user N");
    assert_eq!(patterns[0].details["count"], 4);
    assert_eq!(patterns[0].severity, "ERROR");
    // events also reach the sink
    assert_eq!(sink.published.lock().unwrap().len(), saved.len());
}

#[test]
fn pattern_examples_are_capped_at_five() {
    let logs: Vec<ApplicationLog> = (0..8)
        .map(|i| {
            make_log(
                "app-1",
                "checkout",
                LogSeverity::Error,
                &format!("timeout after {i} retries"),
            )
        })
        .collect();
    let refs: Vec<&ApplicationLog> = logs.iter().collect();

    let events = error_pattern_events(&refs);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].details["examples"].as_array().unwrap().len(), 5);
    assert_eq!(events[0].details["count"], 8);
}

struct SwappableLogStore {
    logs: Mutex<Vec<ApplicationLog>>,
}

#[async_trait]
impl LogStore for SwappableLogStore {
    async fn batch_insert_logs(&self, _logs: &[ApplicationLog]) -> Result<()> {
        Ok(())
    }

    async fn get_recent_logs(&self, _window: Duration) -> Result<Vec<ApplicationLog>> {
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn query_logs(&self, _query: &LogQuery) -> Result<LogQueryResult> {
        Ok(LogQueryResult {
            logs: vec![],
            total_count: 0,
            has_more: false,
        })
    }
}

fn cycle_logs(errors: usize, total: usize) -> Vec<ApplicationLog> {
    (0..total)
        .map(|i| {
            let severity = if i < errors {
                LogSeverity::Error
            } else {
                LogSeverity::Info
            };
            // distinct messages keep the pattern clusters below threshold
            make_log("app-1", "api", severity, &format!("event kind-{i} body-{i}"))
        })
        .collect()
}

#[tokio::test]
async fn error_rate_spike_raises_an_anomaly() {
    let log_store = Arc::new(SwappableLogStore {
        logs: Mutex::new(cycle_logs(1, 20)),
    });
    let store = Arc::new(CapturingAnalysisStore::default());
    let sink = Arc::new(CapturingSink::default());
    let analyzer = Analyzer::new(
        log_store.clone(),
        store.clone(),
        sink,
        Duration::from_secs(60),
    );

    // Build a calm baseline, then spike the error rate.
    for _ in 0..10 {
        analyzer.analyze().await;
    }
    assert!(store
        .saved
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.kind != AnalysisKind::ErrorRateAnomaly));

    *log_store.logs.lock().unwrap() = cycle_logs(15, 20);
    analyzer.analyze().await;

    let saved = store.saved.lock().unwrap();
    let anomaly = saved
        .iter()
        .find(|e| e.kind == AnalysisKind::ErrorRateAnomaly)
        .expect("rate anomaly emitted");
    assert_eq!(anomaly.severity, "high");
    assert!((anomaly.details["current_rate"].as_f64().unwrap() - 0.75).abs() < 1e-9);
    assert!(anomaly.details["baseline_stddev"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn stable_error_rate_does_not_alarm() {
    let mut logs = Vec::new();
    for _ in 0..20 {
        logs.push(make_log("app-1", "api", LogSeverity::Info, "served"));
    }
    logs.push(make_log("app-1", "api", LogSeverity::Error, "one-off"));

    let store = Arc::new(CapturingAnalysisStore::default());
    let sink = Arc::new(CapturingSink::default());
    let analyzer = Analyzer::new(
        Arc::new(StubLogStore { logs }),
        store.clone(),
        sink,
        Duration::from_secs(60),
    );

    analyzer.analyze().await;

    assert!(store
        .saved
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.kind != AnalysisKind::ErrorRateAnomaly));
}

#[test]
fn latency_anomalies_become_analysis_events() {
    let store = Arc::new(CapturingAnalysisStore::default());
    let sink = Arc::new(CapturingSink::default());
    let analyzer = Analyzer::new(
        Arc::new(StubLogStore { logs: vec![] }),
        store,
        sink,
        Duration::from_secs(60),
    );

    let mut values: Vec<f64> = (0..60).map(|i| 0.2 + 0.01 * ((i % 7) as f64)).collect();
    values.push(9.0);
    let events = analyzer.detect_latency_anomalies("tgt-1", &series(&values));

    assert!(!events.is_empty());
    assert!(events
        .iter()
        .all(|e| e.kind == AnalysisKind::LatencyAnomaly));
    assert_eq!(events.last().unwrap().details["source"], "tgt-1");
}
