use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity levels carried by ingested application logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogSeverity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSeverity::Debug => write!(f, "DEBUG"),
            LogSeverity::Info => write!(f, "INFO"),
            LogSeverity::Warn => write!(f, "WARN"),
            LogSeverity::Error => write!(f, "ERROR"),
            LogSeverity::Fatal => write!(f, "FATAL"),
        }
    }
}

impl std::str::FromStr for LogSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogSeverity::Debug),
            "INFO" => Ok(LogSeverity::Info),
            "WARN" => Ok(LogSeverity::Warn),
            "ERROR" => Ok(LogSeverity::Error),
            "FATAL" => Ok(LogSeverity::Fatal),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Authentication applied to outgoing probe requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum AuthConfig {
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    #[serde(rename = "apikey")]
    ApiKey {
        key: String,
        location: ApiKeyLocation,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
}

/// An external HTTP endpoint checked on a cron schedule.
///
/// Mutated only through the admin API; the probe scheduler treats a target
/// as immutable between add/remove calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringTarget {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Cron expression with seconds precision.
    pub frequency: String,
    /// Per-request timeout as a duration string (`5s`, `1m`).
    pub timeout: String,
    #[serde(default)]
    pub expected_status: Vec<u16>,
    /// Ordered assertion rules, kept as raw JSON and parsed at evaluation
    /// time; a malformed specification fails the assertion.
    #[serde(default)]
    pub response_rules: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config: Option<AuthConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a single probe firing. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub id: String,
    pub target_id: String,
    pub status_code: u16,
    /// Wall-clock seconds from request start to body read.
    pub response_time: f64,
    pub success: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    /// First 1 MiB of the response body; the remainder is discarded.
    #[serde(default)]
    pub response_body: String,
    pub timestamp: DateTime<Utc>,
}

/// A single application log entry. Immutable after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationLog {
    #[serde(default)]
    pub id: String,
    pub application_id: String,
    pub service_name: String,
    pub severity: LogSeverity,
    pub message: String,
    /// Defaulted to ingestion time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    ErrorRateAnomaly,
    ErrorPattern,
    LatencyAnomaly,
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisKind::ErrorRateAnomaly => write!(f, "error_rate_anomaly"),
            AnalysisKind::ErrorPattern => write!(f, "error_pattern"),
            AnalysisKind::LatencyAnomaly => write!(f, "latency_anomaly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Active,
    Acknowledged,
    Resolved,
}

/// A finding produced by the analyzer (rate anomaly, recurring error
/// pattern, latency anomaly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnalysisKind,
    pub severity: String,
    pub description: String,
    pub details: serde_json::Value,
    pub detected_at: DateTime<Utc>,
    pub status: AnalysisStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    /// Probe target id or analysis id that triggered the alert.
    pub source_id: String,
    pub severity: String,
    pub message: String,
    /// Serialized triggering event.
    pub details: serde_json::Value,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}
