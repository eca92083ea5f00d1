use apiwatch_common::types::Alert;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing;

/// A rule value: scalar or list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CondValue {
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<CondValue>),
}

impl CondValue {
    fn matches_eq(&self, field: &serde_json::Value) -> bool {
        match (self, field) {
            (CondValue::Str(s), serde_json::Value::String(f)) => s == f,
            (CondValue::Num(n), serde_json::Value::Number(m)) => m.as_f64() == Some(*n),
            (CondValue::Bool(b), serde_json::Value::Bool(f)) => b == f,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CondOperator {
    Equals,
    Contains,
    In,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationCondition {
    pub field: String,
    pub operator: CondOperator,
    pub value: CondValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub conditions: Vec<CorrelationCondition>,
    /// Field paths whose values are concatenated into the group key.
    pub group_by: Vec<String>,
    pub min_count: usize,
    /// Seconds; alerts older than `last_seen - time_window` drop out of the
    /// group.
    pub time_window_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Critical,
    Resolved,
}

/// A reference to an alert inside a group. Groups hold ids rather than
/// alerts; the full record lives in the alert store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedAlert {
    pub alert_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertGroup {
    /// Deterministic key: `rule_id:field₁:field₂…`
    pub id: String,
    pub rule_id: String,
    pub alerts: Vec<GroupedAlert>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: GroupStatus,
    /// `alert count / rule min_count`
    pub score: f64,
}

pub struct CorrelationEngine {
    rules: Vec<CorrelationRule>,
    active_groups: RwLock<HashMap<String, AlertGroup>>,
    group_ttl: Duration,
    cleanup_interval: std::time::Duration,
}

impl CorrelationEngine {
    pub fn new(rules: Vec<CorrelationRule>) -> Self {
        Self {
            rules,
            active_groups: RwLock::new(HashMap::new()),
            group_ttl: Duration::hours(24),
            cleanup_interval: std::time::Duration::from_secs(3600),
        }
    }

    pub fn with_group_ttl(mut self, ttl: Duration) -> Self {
        self.group_ttl = ttl;
        self
    }

    /// Routes an alert into every matching rule's group and returns the ids
    /// of the groups it touched.
    pub fn process_alert(&self, alert: &Alert) -> Vec<String> {
        let mut groups = self
            .active_groups
            .write()
            .unwrap_or_else(|p| p.into_inner());
        let mut touched = Vec::new();

        for rule in &self.rules {
            if !rule.conditions.iter().all(|c| matches_condition(alert, c)) {
                continue;
            }

            let key = group_key(alert, rule);
            let group = groups.entry(key.clone()).or_insert_with(|| AlertGroup {
                id: key.clone(),
                rule_id: rule.id.clone(),
                alerts: Vec::new(),
                first_seen: alert.created_at,
                last_seen: alert.created_at,
                status: GroupStatus::Active,
                score: 0.0,
            });

            group.alerts.push(GroupedAlert {
                alert_id: alert.id.clone(),
                created_at: alert.created_at,
            });
            group.last_seen = alert.created_at;

            let window = Duration::seconds(rule.time_window_secs as i64);
            let cutoff = group.last_seen - window;
            group.alerts.retain(|a| a.created_at >= cutoff);

            group.score = group.alerts.len() as f64 / rule.min_count.max(1) as f64;
            group.status = if group.alerts.len() >= rule.min_count {
                GroupStatus::Critical
            } else {
                GroupStatus::Active
            };

            if group.status == GroupStatus::Critical {
                tracing::info!(
                    group_id = %group.id,
                    rule_id = %rule.id,
                    alerts = group.alerts.len(),
                    score = group.score,
                    "Alert group critical"
                );
            }

            touched.push(key);
        }

        touched
    }

    /// Non-resolved groups as a snapshot copy, sorted by descending score.
    pub fn get_active_groups(&self) -> Vec<AlertGroup> {
        let groups = self.active_groups.read().unwrap_or_else(|p| p.into_inner());
        let mut snapshot: Vec<AlertGroup> = groups
            .values()
            .filter(|g| g.status != GroupStatus::Resolved)
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        snapshot
    }

    pub fn resolve_group(&self, group_id: &str) -> anyhow::Result<()> {
        let mut groups = self
            .active_groups
            .write()
            .unwrap_or_else(|p| p.into_inner());
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| anyhow::anyhow!("group not found: {group_id}"))?;
        group.status = GroupStatus::Resolved;
        Ok(())
    }

    /// Drops groups whose `last_seen` is older than the group TTL. Returns
    /// the number removed.
    pub fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.group_ttl;
        let mut groups = self
            .active_groups
            .write()
            .unwrap_or_else(|p| p.into_inner());
        let before = groups.len();
        groups.retain(|_, g| g.last_seen >= cutoff);
        before - groups.len()
    }

    /// Background sweeper removing expired groups every cleanup interval.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(engine.cleanup_interval);
            tick.tick().await; // first tick fires immediately
            loop {
                tick.tick().await;
                let removed = engine.cleanup();
                if removed > 0 {
                    tracing::info!(removed, "Expired alert groups removed");
                }
            }
        })
    }
}

fn field_value(alert: &Alert, field: &str) -> Option<serde_json::Value> {
    match field {
        "type" => Some(serde_json::Value::String(alert.kind.clone())),
        "source" => Some(serde_json::Value::String(alert.source.clone())),
        "severity" => Some(serde_json::Value::String(alert.severity.clone())),
        _ => alert.details.get(field).cloned(),
    }
}

fn matches_condition(alert: &Alert, cond: &CorrelationCondition) -> bool {
    let Some(value) = field_value(alert, &cond.field) else {
        return false;
    };

    match cond.operator {
        CondOperator::Equals => cond.value.matches_eq(&value),
        CondOperator::Contains => match (&cond.value, &value) {
            (CondValue::Str(pattern), serde_json::Value::String(field)) => {
                field.contains(pattern.as_str())
            }
            _ => false,
        },
        CondOperator::In => match &cond.value {
            CondValue::List(items) => items.iter().any(|item| item.matches_eq(&value)),
            _ => false,
        },
    }
}

fn group_key(alert: &Alert, rule: &CorrelationRule) -> String {
    let mut parts = vec![rule.id.clone()];
    for field in &rule.group_by {
        let value = field_value(alert, field)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        parts.push(value);
    }
    parts.join(":")
}
