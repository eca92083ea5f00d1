use crate::correlation::CorrelationEngine;
use crate::{
    AnalysisConditions, MonitoringConditions, Notifier, Rule, RuleKind, RuleState,
};
use anyhow::Result;
use apiwatch_common::types::{Alert, AlertStatus, AnalysisEvent, ProbeResult};
use apiwatch_storage::AlertStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing;

pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    notifiers: Vec<Arc<dyn Notifier>>,
    correlation: Arc<CorrelationEngine>,
    rules: RwLock<Vec<RuleState>>,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn AlertStore>,
        notifiers: Vec<Arc<dyn Notifier>>,
        correlation: Arc<CorrelationEngine>,
    ) -> Self {
        Self {
            store,
            notifiers,
            correlation,
            rules: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_rule(&self, rule: Rule) {
        let mut rules = self.rules.write().await;
        rules.retain(|state| state.rule.id != rule.id);
        rules.push(RuleState {
            rule,
            last_triggered: Default::default(),
        });
    }

    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|state| state.rule.id != rule_id);
        rules.len() < before
    }

    /// Evaluates monitoring rules against one probe result and returns the
    /// alerts created.
    pub async fn process_probe_result(&self, result: &ProbeResult) -> Result<Vec<Alert>> {
        let matched = self
            .gate_and_match(RuleKind::Monitoring, &result.target_id, |rule| {
                evaluate_monitoring(&rule.conditions, result)
            })
            .await;

        let mut created = Vec::new();
        for rule in matched {
            let details = serde_json::to_value(result)?;
            created.push(
                self.create_alert(&rule, &result.target_id, details).await?,
            );
        }
        Ok(created)
    }

    /// Evaluates analysis rules against one analysis event and returns the
    /// alerts created.
    pub async fn process_analysis(&self, analysis: &AnalysisEvent) -> Result<Vec<Alert>> {
        let matched = self
            .gate_and_match(RuleKind::AiAnalysis, &analysis.id, |rule| {
                evaluate_analysis(&rule.conditions, analysis)
            })
            .await;

        let mut created = Vec::new();
        for rule in matched {
            let details = serde_json::to_value(analysis)?;
            created.push(self.create_alert(&rule, &analysis.id, details).await?);
        }
        Ok(created)
    }

    /// Applies the cooldown gate and condition predicate to every rule of
    /// the given kind, in one critical section per rule so the cooldown
    /// check-and-stamp is atomic.
    ///
    /// A rule that passes the gate has its `last_triggered` stamped before
    /// the conditions are evaluated, so a non-matching event still opens a
    /// fresh cooldown window for that source.
    async fn gate_and_match<F>(&self, kind: RuleKind, source_id: &str, matches: F) -> Vec<Rule>
    where
        F: Fn(&Rule) -> bool,
    {
        let now = Utc::now();
        let mut rules = self.rules.write().await;
        let mut matched = Vec::new();

        for state in rules.iter_mut() {
            if state.rule.kind != kind {
                continue;
            }

            if let Some(last) = state.last_triggered.get(source_id) {
                let elapsed = (now - *last).to_std().unwrap_or_default();
                if elapsed < state.rule.cooldown {
                    tracing::debug!(
                        rule_id = %state.rule.id,
                        source_id,
                        "Alert suppressed (cooldown)"
                    );
                    continue;
                }
            }
            state.last_triggered.insert(source_id.to_string(), now);

            if matches(&state.rule) {
                matched.push(state.rule.clone());
            }
        }

        matched
    }

    async fn create_alert(
        &self,
        rule: &Rule,
        source_id: &str,
        details: serde_json::Value,
    ) -> Result<Alert> {
        let now = Utc::now();
        let alert = Alert {
            id: apiwatch_common::id::next_id(),
            kind: rule.kind.to_string(),
            source: rule.source.clone(),
            source_id: source_id.to_string(),
            severity: rule.severity.clone(),
            message: rule.message.clone(),
            details,
            status: AlertStatus::Active,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            resolved_by: None,
        };

        self.store.save_alert(&alert).await?;
        tracing::info!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            source_id,
            severity = %alert.severity,
            "Alert created"
        );

        for notifier in &self.notifiers {
            if let Err(e) = notifier.send(&alert).await {
                tracing::error!(alert_id = %alert.id, error = %e, "Failed to send notification");
            }
        }

        self.correlation.process_alert(&alert);

        Ok(alert)
    }

    pub async fn resolve_alert(&self, alert_id: &str, resolved_by: &str) -> Result<()> {
        let mut alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("alert not found: {alert_id}"))?;

        let now = Utc::now();
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        alert.resolved_by = Some(resolved_by.to_string());
        alert.updated_at = now;

        self.store.update_alert(&alert).await
    }
}

fn evaluate_monitoring(conditions: &serde_json::Value, result: &ProbeResult) -> bool {
    let cond: MonitoringConditions = match serde_json::from_value(conditions.clone()) {
        Ok(cond) => cond,
        Err(_) => return false,
    };

    if let Some(codes) = &cond.status_codes {
        if !codes.contains(&result.status_code) {
            return false;
        }
    }
    if let Some(min_latency) = cond.min_latency {
        if result.response_time < min_latency {
            return false;
        }
    }
    if let Some(pattern) = &cond.error_match {
        if result.error.is_empty() || !result.error.contains(pattern) {
            return false;
        }
    }
    true
}

fn evaluate_analysis(conditions: &serde_json::Value, analysis: &AnalysisEvent) -> bool {
    let cond: AnalysisConditions = match serde_json::from_value(conditions.clone()) {
        Ok(cond) => cond,
        Err(_) => return false,
    };

    if let Some(types) = &cond.types {
        if !types.iter().any(|t| *t == analysis.kind.to_string()) {
            return false;
        }
    }
    if let Some(severities) = &cond.severities {
        if !severities.iter().any(|s| *s == analysis.severity) {
            return false;
        }
    }
    true
}
