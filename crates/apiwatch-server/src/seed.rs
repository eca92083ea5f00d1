use apiwatch_alert::correlation::{
    CondOperator, CondValue, CorrelationCondition, CorrelationRule,
};
use apiwatch_alert::manager::AlertManager;
use apiwatch_alert::{Rule, RuleKind};
use std::time::Duration;

/// Registers the built-in alert rules. Deployments tune or replace these
/// through the rule API; the defaults keep a fresh install alerting out of
/// the box.
pub async fn register_default_rules(manager: &AlertManager) {
    let rules = vec![
        Rule {
            id: "probe-server-error".into(),
            kind: RuleKind::Monitoring,
            source: "probe".into(),
            conditions: serde_json::json!({"status_codes": [500, 502, 503, 504]}),
            severity: "critical".into(),
            message: "Monitored endpoint returned a server error".into(),
            cooldown: Duration::from_secs(300),
        },
        Rule {
            id: "probe-unreachable".into(),
            kind: RuleKind::Monitoring,
            source: "probe".into(),
            conditions: serde_json::json!({"error_match": "Request failed"}),
            severity: "critical".into(),
            message: "Monitored endpoint is unreachable".into(),
            cooldown: Duration::from_secs(300),
        },
        Rule {
            id: "probe-slow".into(),
            kind: RuleKind::Monitoring,
            source: "probe".into(),
            conditions: serde_json::json!({"min_latency": 5.0}),
            severity: "warning".into(),
            message: "Monitored endpoint is responding slowly".into(),
            cooldown: Duration::from_secs(600),
        },
        Rule {
            id: "analysis-anomaly".into(),
            kind: RuleKind::AiAnalysis,
            source: "analyzer".into(),
            conditions: serde_json::json!({
                "types": ["error_rate_anomaly", "latency_anomaly"]
            }),
            severity: "high".into(),
            message: "Anomaly detected in application behavior".into(),
            cooldown: Duration::from_secs(1800),
        },
        Rule {
            id: "analysis-error-pattern".into(),
            kind: RuleKind::AiAnalysis,
            source: "analyzer".into(),
            conditions: serde_json::json!({"types": ["error_pattern"]}),
            severity: "warning".into(),
            message: "Recurring error pattern detected".into(),
            cooldown: Duration::from_secs(3600),
        },
    ];

    for rule in rules {
        manager.add_rule(rule).await;
    }
}

/// Built-in correlation rules: repeated high-severity alerts from one
/// source collapse into a single group.
pub fn default_correlation_rules() -> Vec<CorrelationRule> {
    vec![CorrelationRule {
        id: "repeated-source-failures".into(),
        name: "Repeated failures from one source".into(),
        description: "Groups high-severity alerts emitted by the same source".into(),
        conditions: vec![CorrelationCondition {
            field: "severity".into(),
            operator: CondOperator::In,
            value: CondValue::List(vec![
                CondValue::Str("critical".into()),
                CondValue::Str("high".into()),
            ]),
        }],
        group_by: vec!["source".into()],
        min_count: 3,
        time_window_secs: 600,
    }]
}
