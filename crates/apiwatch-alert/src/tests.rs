use crate::correlation::{
    CondOperator, CondValue, CorrelationCondition, CorrelationEngine, CorrelationRule,
    GroupStatus,
};
use crate::manager::AlertManager;
use crate::{Notifier, Rule, RuleKind};
use anyhow::Result;
use apiwatch_common::types::{
    Alert, AlertStatus, AnalysisEvent, AnalysisKind, AnalysisStatus, ProbeResult,
};
use apiwatch_storage::AlertStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

#[derive(Default)]
struct MemoryAlertStore {
    alerts: Mutex<Vec<Alert>>,
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn update_alert(&self, alert: &Alert) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(stored) => {
                *stored = alert.clone();
                Ok(())
            }
            None => anyhow::bail!("alert not found: {}", alert.id),
        }
    }

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn get_active_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status == AlertStatus::Active)
            .cloned()
            .collect())
    }
}

struct CountingNotifier {
    sent: AtomicUsize,
    fail: bool,
}

impl CountingNotifier {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send(&self, _alert: &Alert) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("channel unavailable");
        }
        Ok(())
    }
}

fn failure_result(target_id: &str) -> ProbeResult {
    ProbeResult {
        id: apiwatch_common::id::next_id(),
        target_id: target_id.to_string(),
        status_code: 500,
        response_time: 0.25,
        success: false,
        error: "Request failed: connection refused".into(),
        response_headers: HashMap::new(),
        response_body: String::new(),
        timestamp: Utc::now(),
    }
}

fn monitoring_rule(id: &str, cooldown: StdDuration, conditions: serde_json::Value) -> Rule {
    Rule {
        id: id.to_string(),
        kind: RuleKind::Monitoring,
        source: "probe".into(),
        conditions,
        severity: "critical".into(),
        message: "endpoint failing".into(),
        cooldown,
    }
}

fn manager_with(
    store: Arc<MemoryAlertStore>,
    notifiers: Vec<Arc<dyn Notifier>>,
) -> AlertManager {
    let correlation = Arc::new(CorrelationEngine::new(vec![]));
    AlertManager::new(store, notifiers, correlation)
}

#[tokio::test]
async fn cooldown_limits_a_burst_to_one_alert() {
    let store = Arc::new(MemoryAlertStore::default());
    let manager = manager_with(store.clone(), vec![]);
    manager
        .add_rule(monitoring_rule(
            "r1",
            StdDuration::from_secs(60),
            serde_json::json!({"status_codes": [500]}),
        ))
        .await;

    let mut created = 0;
    for _ in 0..10 {
        created += manager
            .process_probe_result(&failure_result("tgt-1"))
            .await
            .unwrap()
            .len();
    }

    assert_eq!(created, 1);
    assert_eq!(store.alerts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cooldown_is_scoped_per_source() {
    let store = Arc::new(MemoryAlertStore::default());
    let manager = manager_with(store.clone(), vec![]);
    manager
        .add_rule(monitoring_rule(
            "r1",
            StdDuration::from_secs(60),
            serde_json::json!({"status_codes": [500]}),
        ))
        .await;

    manager
        .process_probe_result(&failure_result("tgt-1"))
        .await
        .unwrap();
    let second = manager
        .process_probe_result(&failure_result("tgt-2"))
        .await
        .unwrap();

    assert_eq!(second.len(), 1, "a different target has its own cooldown");
}

#[tokio::test]
async fn monitoring_conditions_all_present_clauses_must_hold() {
    let store = Arc::new(MemoryAlertStore::default());
    let manager = manager_with(store.clone(), vec![]);
    manager
        .add_rule(monitoring_rule(
            "r1",
            StdDuration::ZERO,
            serde_json::json!({
                "status_codes": [500, 502],
                "min_latency": 0.2,
                "error_match": "connection"
            }),
        ))
        .await;

    // All clauses hold.
    assert_eq!(
        manager
            .process_probe_result(&failure_result("tgt-1"))
            .await
            .unwrap()
            .len(),
        1
    );

    // Latency clause fails.
    let mut fast = failure_result("tgt-1");
    fast.response_time = 0.05;
    assert!(manager
        .process_probe_result(&fast)
        .await
        .unwrap()
        .is_empty());

    // Error clause fails on empty error.
    let mut silent = failure_result("tgt-1");
    silent.error = String::new();
    assert!(manager
        .process_probe_result(&silent)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn analysis_rules_ignore_probe_results() {
    let store = Arc::new(MemoryAlertStore::default());
    let manager = manager_with(store.clone(), vec![]);
    manager
        .add_rule(Rule {
            id: "r-ai".into(),
            kind: RuleKind::AiAnalysis,
            source: "analyzer".into(),
            conditions: serde_json::json!({"types": ["error_rate_anomaly"]}),
            severity: "high".into(),
            message: "anomaly".into(),
            cooldown: StdDuration::ZERO,
        })
        .await;

    assert!(manager
        .process_probe_result(&failure_result("tgt-1"))
        .await
        .unwrap()
        .is_empty());

    let analysis = AnalysisEvent {
        id: apiwatch_common::id::next_id(),
        kind: AnalysisKind::ErrorRateAnomaly,
        severity: "high".into(),
        description: "spike".into(),
        details: serde_json::json!({"current_rate": 0.4}),
        detected_at: Utc::now(),
        status: AnalysisStatus::Active,
    };
    let created = manager.process_analysis(&analysis).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].source_id, analysis.id);
    assert_eq!(created[0].details["type"], "error_rate_anomaly");
}

#[tokio::test]
async fn malformed_conditions_never_trigger() {
    let store = Arc::new(MemoryAlertStore::default());
    let manager = manager_with(store.clone(), vec![]);
    manager
        .add_rule(monitoring_rule(
            "r1",
            StdDuration::ZERO,
            serde_json::json!({"status_codes": "not-a-list"}),
        ))
        .await;

    assert!(manager
        .process_probe_result(&failure_result("tgt-1"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn failing_notifier_does_not_abort_alert_creation() {
    let store = Arc::new(MemoryAlertStore::default());
    let failing = CountingNotifier::new(true);
    let healthy = CountingNotifier::new(false);
    let manager = manager_with(store.clone(), vec![failing.clone(), healthy.clone()]);
    manager
        .add_rule(monitoring_rule(
            "r1",
            StdDuration::ZERO,
            serde_json::json!({}),
        ))
        .await;

    let created = manager
        .process_probe_result(&failure_result("tgt-1"))
        .await
        .unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(failing.sent.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resolve_alert_stamps_resolution_fields() {
    let store = Arc::new(MemoryAlertStore::default());
    let manager = manager_with(store.clone(), vec![]);
    manager
        .add_rule(monitoring_rule(
            "r1",
            StdDuration::ZERO,
            serde_json::json!({}),
        ))
        .await;

    let created = manager
        .process_probe_result(&failure_result("tgt-1"))
        .await
        .unwrap();
    manager.resolve_alert(&created[0].id, "ops").await.unwrap();

    let stored = store.get_alert(&created[0].id).await.unwrap().unwrap();
    assert_eq!(stored.status, AlertStatus::Resolved);
    assert_eq!(stored.resolved_by.as_deref(), Some("ops"));
    assert!(stored.resolved_at.is_some());
}

// ── Correlation ──

fn make_alert(source: &str, severity: &str, secs_ago: i64) -> Alert {
    let created = Utc::now() - Duration::seconds(secs_ago);
    Alert {
        id: apiwatch_common::id::next_id(),
        kind: "monitoring".into(),
        source: source.into(),
        source_id: "tgt-1".into(),
        severity: severity.into(),
        message: "m".into(),
        details: serde_json::json!({"region": "eu-west-1"}),
        status: AlertStatus::Active,
        created_at: created,
        updated_at: created,
        resolved_at: None,
        resolved_by: None,
    }
}

fn group_by_source_rule(min_count: usize, window_secs: u64) -> CorrelationRule {
    CorrelationRule {
        id: "cr-1".into(),
        name: "repeated source failures".into(),
        description: String::new(),
        conditions: vec![CorrelationCondition {
            field: "type".into(),
            operator: CondOperator::Equals,
            value: CondValue::Str("monitoring".into()),
        }],
        group_by: vec!["source".into()],
        min_count,
        time_window_secs: window_secs,
    }
}

#[test]
fn three_alerts_within_window_make_a_critical_group() {
    let engine = CorrelationEngine::new(vec![group_by_source_rule(3, 600)]);

    for secs_ago in [300, 200, 100] {
        engine.process_alert(&make_alert("svc-A", "critical", secs_ago));
    }

    let groups = engine.get_active_groups();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.id, "cr-1:svc-A");
    assert_eq!(group.status, GroupStatus::Critical);
    assert!((group.score - 1.0).abs() < 1e-9);
    assert_eq!(group.alerts.len(), 3);
}

#[test]
fn alerts_outside_the_window_drop_out() {
    let engine = CorrelationEngine::new(vec![group_by_source_rule(3, 600)]);

    engine.process_alert(&make_alert("svc-A", "critical", 3000));
    engine.process_alert(&make_alert("svc-A", "critical", 100));
    engine.process_alert(&make_alert("svc-A", "critical", 50));

    let groups = engine.get_active_groups();
    assert_eq!(groups[0].alerts.len(), 2, "the stale alert was trimmed");
    assert_eq!(groups[0].status, GroupStatus::Active);
}

#[test]
fn groups_are_keyed_by_group_by_fields() {
    let engine = CorrelationEngine::new(vec![group_by_source_rule(2, 600)]);

    engine.process_alert(&make_alert("svc-A", "critical", 10));
    engine.process_alert(&make_alert("svc-B", "critical", 5));

    let groups = engine.get_active_groups();
    assert_eq!(groups.len(), 2);
    let ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
    assert!(ids.contains(&"cr-1:svc-A"));
    assert!(ids.contains(&"cr-1:svc-B"));
}

#[test]
fn condition_operators() {
    let alert = make_alert("svc-A", "critical", 0);

    let contains_rule = CorrelationRule {
        id: "cr-contains".into(),
        name: "n".into(),
        description: String::new(),
        conditions: vec![CorrelationCondition {
            field: "source".into(),
            operator: CondOperator::Contains,
            value: CondValue::Str("svc".into()),
        }],
        group_by: vec![],
        min_count: 1,
        time_window_secs: 600,
    };
    let in_rule = CorrelationRule {
        id: "cr-in".into(),
        name: "n".into(),
        description: String::new(),
        conditions: vec![CorrelationCondition {
            field: "severity".into(),
            operator: CondOperator::In,
            value: CondValue::List(vec![
                CondValue::Str("high".into()),
                CondValue::Str("critical".into()),
            ]),
        }],
        group_by: vec![],
        min_count: 1,
        time_window_secs: 600,
    };
    let details_rule = CorrelationRule {
        id: "cr-details".into(),
        name: "n".into(),
        description: String::new(),
        conditions: vec![CorrelationCondition {
            field: "region".into(),
            operator: CondOperator::Equals,
            value: CondValue::Str("eu-west-1".into()),
        }],
        group_by: vec![],
        min_count: 1,
        time_window_secs: 600,
    };
    let missing_field_rule = CorrelationRule {
        id: "cr-missing".into(),
        name: "n".into(),
        description: String::new(),
        conditions: vec![CorrelationCondition {
            field: "zone".into(),
            operator: CondOperator::Equals,
            value: CondValue::Str("a".into()),
        }],
        group_by: vec![],
        min_count: 1,
        time_window_secs: 600,
    };

    let engine = CorrelationEngine::new(vec![
        contains_rule,
        in_rule,
        details_rule,
        missing_field_rule,
    ]);
    let touched = engine.process_alert(&alert);
    assert_eq!(touched.len(), 3, "missing details field must not match");
}

#[test]
fn resolved_groups_are_hidden_and_cleanup_drops_stale_groups() {
    let engine = CorrelationEngine::new(vec![group_by_source_rule(1, 600)])
        .with_group_ttl(Duration::seconds(60));

    engine.process_alert(&make_alert("svc-A", "critical", 0));
    engine.process_alert(&make_alert("svc-B", "critical", 120));

    engine.resolve_group("cr-1:svc-A").unwrap();
    assert_eq!(engine.get_active_groups().len(), 1);

    // svc-B's last_seen is past the 60s TTL.
    assert_eq!(engine.cleanup(), 1);

    assert!(engine.resolve_group("cr-1:ghost").is_err());
}

#[test]
fn active_groups_sorted_by_descending_score() {
    let engine = CorrelationEngine::new(vec![group_by_source_rule(2, 600)]);

    engine.process_alert(&make_alert("svc-A", "critical", 10));
    for secs_ago in [30, 20, 10] {
        engine.process_alert(&make_alert("svc-B", "critical", secs_ago));
    }

    let groups = engine.get_active_groups();
    assert_eq!(groups[0].id, "cr-1:svc-B");
    assert!(groups[0].score > groups[1].score);
}
