//! Alert rule evaluation and correlation.
//!
//! The [`manager::AlertManager`] matches probe results and analysis events
//! against registered rules, enforces per-(rule, source) cooldowns, persists
//! the resulting alerts and drives notification and correlation. The
//! [`correlation::CorrelationEngine`] groups related alerts by rule and
//! grouping fields within a sliding time window.

pub mod correlation;
pub mod manager;

#[cfg(test)]
mod tests;

use anyhow::Result;
use apiwatch_common::types::Alert;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Delivers a freshly created alert. One failing notifier never aborts the
/// others; the manager logs and continues.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Monitoring,
    AiAnalysis,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Monitoring => write!(f, "monitoring"),
            RuleKind::AiAnalysis => write!(f, "ai_analysis"),
        }
    }
}

/// An alerting rule. The condition payload is kind-specific and parsed at
/// evaluation time; a malformed payload never triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub kind: RuleKind,
    /// Alert source label stamped on produced alerts (e.g. `"probe"`).
    pub source: String,
    pub conditions: serde_json::Value,
    pub severity: String,
    pub message: String,
    /// Minimum spacing between two alerts from this rule for one source id.
    #[serde(with = "cooldown_secs")]
    pub cooldown: Duration,
}

mod cooldown_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Conditions read by `monitoring` rules; every present clause must hold.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringConditions {
    pub status_codes: Option<Vec<u16>>,
    pub min_latency: Option<f64>,
    pub error_match: Option<String>,
}

/// Conditions read by `ai_analysis` rules; every present clause must hold.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisConditions {
    pub types: Option<Vec<String>>,
    pub severities: Option<Vec<String>>,
}

/// Per-rule evaluation state: the rule plus its last-trigger timestamps.
#[derive(Debug)]
pub(crate) struct RuleState {
    pub rule: Rule,
    pub last_triggered: HashMap<String, DateTime<Utc>>,
}
