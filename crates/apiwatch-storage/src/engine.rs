use crate::error::StorageError;
use crate::{
    AlertStore, AnalysisStore, LogQuery, LogQueryResult, LogStore, ProbeStore, ProbeSummary,
    TargetStore,
};
use anyhow::Result;
use apiwatch_common::types::{
    Alert, AlertStatus, AnalysisEvent, AnalysisKind, AnalysisStatus, ApplicationLog, LogSeverity,
    MonitoringTarget, ProbeResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Single-file SQLite backend implementing every store trait.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS monitoring_targets (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                url             TEXT NOT NULL,
                method          TEXT NOT NULL,
                headers         TEXT NOT NULL,
                body            TEXT,
                frequency       TEXT NOT NULL,
                timeout         TEXT NOT NULL,
                expected_status TEXT NOT NULL,
                response_rules  TEXT NOT NULL,
                auth_config     TEXT,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS probe_results (
                id               TEXT PRIMARY KEY,
                target_id        TEXT NOT NULL,
                status_code      INTEGER NOT NULL,
                response_time    REAL NOT NULL,
                success          INTEGER NOT NULL,
                error            TEXT NOT NULL,
                response_headers TEXT NOT NULL,
                response_body    TEXT NOT NULL,
                timestamp        INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_probe_results_target
                ON probe_results (target_id, timestamp);
            CREATE TABLE IF NOT EXISTS app_logs (
                id             TEXT PRIMARY KEY,
                application_id TEXT NOT NULL,
                service_name   TEXT NOT NULL,
                severity       TEXT NOT NULL,
                message        TEXT NOT NULL,
                timestamp      INTEGER NOT NULL,
                instance_id    TEXT,
                trace_id       TEXT,
                user_id        TEXT,
                source         TEXT,
                payload        TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_app_logs_stream
                ON app_logs (application_id, service_name, timestamp);
            CREATE TABLE IF NOT EXISTS analyses (
                id          TEXT PRIMARY KEY,
                type        TEXT NOT NULL,
                severity    TEXT NOT NULL,
                description TEXT NOT NULL,
                details     TEXT NOT NULL,
                detected_at INTEGER NOT NULL,
                status      TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS alerts (
                id          TEXT PRIMARY KEY,
                type        TEXT NOT NULL,
                source      TEXT NOT NULL,
                source_id   TEXT NOT NULL,
                severity    TEXT NOT NULL,
                message     TEXT NOT NULL,
                details     TEXT NOT NULL,
                status      TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL,
                resolved_at INTEGER,
                resolved_by TEXT
            );",
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deletes logs, probe results and analyses older than the retention
    /// window. Returns the number of rows removed.
    pub fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let cutoff_ms = ts_millis(cutoff);
        let conn = self.conn();
        let mut removed = 0;
        removed += conn.execute("DELETE FROM app_logs WHERE timestamp < ?1", params![cutoff_ms])?;
        removed += conn.execute(
            "DELETE FROM probe_results WHERE timestamp < ?1",
            params![cutoff_ms],
        )?;
        removed += conn.execute(
            "DELETE FROM analyses WHERE detected_at < ?1",
            params![cutoff_ms],
        )?;
        Ok(removed)
    }
}

fn ts_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(column: &'static str, ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms).ok_or(StorageError::InvalidColumn {
        column,
        detail: format!("timestamp out of range: {ms}"),
    })
}

fn log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ApplicationLog, i64, String)> {
    let severity: String = row.get(3)?;
    let ts_ms: i64 = row.get(5)?;
    let payload: Option<String> = row.get(10)?;
    let log = ApplicationLog {
        id: row.get(0)?,
        application_id: row.get(1)?,
        service_name: row.get(2)?,
        severity: LogSeverity::Info, // replaced by caller after parse
        message: row.get(4)?,
        timestamp: None,
        instance_id: row.get(6)?,
        trace_id: row.get(7)?,
        user_id: row.get(8)?,
        source: row.get(9)?,
        payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
    };
    Ok((log, ts_ms, severity))
}

fn finish_log(
    (mut log, ts_ms, severity): (ApplicationLog, i64, String),
) -> Result<ApplicationLog, StorageError> {
    log.timestamp = Some(from_millis("timestamp", ts_ms)?);
    log.severity = severity
        .parse()
        .map_err(|detail| StorageError::InvalidColumn {
            column: "severity",
            detail,
        })?;
    Ok(log)
}

#[async_trait]
impl LogStore for SqliteStorage {
    async fn batch_insert_logs(&self, logs: &[ApplicationLog]) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO app_logs (id, application_id, service_name, severity, message,
                     timestamp, instance_id, trace_id, user_id, source, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for log in logs {
                let payload = log
                    .payload
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(StorageError::from)?;
                stmt.execute(params![
                    &log.id,
                    &log.application_id,
                    &log.service_name,
                    log.severity.to_string(),
                    &log.message,
                    ts_millis(log.timestamp.unwrap_or_else(Utc::now)),
                    &log.instance_id,
                    &log.trace_id,
                    &log.user_id,
                    &log.source,
                    payload,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn get_recent_logs(&self, window: Duration) -> Result<Vec<ApplicationLog>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(window)?;
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, application_id, service_name, severity, message, timestamp,
                    instance_id, trace_id, user_id, source, payload
             FROM app_logs WHERE timestamp >= ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![ts_millis(cutoff)], log_from_row)?;
        let mut logs = Vec::new();
        for row in rows {
            logs.push(finish_log(row?)?);
        }
        Ok(logs)
    }

    async fn query_logs(&self, query: &LogQuery) -> Result<LogQueryResult> {
        let mut filters = String::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(app) = &query.application_id {
            params.push(Box::new(app.clone()));
            filters.push_str(&format!(" AND application_id = ?{}", params.len()));
        }
        if let Some(svc) = &query.service_name {
            params.push(Box::new(svc.clone()));
            filters.push_str(&format!(" AND service_name = ?{}", params.len()));
        }
        if let Some(sev) = &query.severity {
            params.push(Box::new(sev.to_uppercase()));
            filters.push_str(&format!(" AND severity = ?{}", params.len()));
        }
        if let Some(start) = query.start {
            params.push(Box::new(ts_millis(start)));
            filters.push_str(&format!(" AND timestamp >= ?{}", params.len()));
        }
        if let Some(end) = query.end {
            params.push(Box::new(ts_millis(end)));
            filters.push_str(&format!(" AND timestamp <= ?{}", params.len()));
        }

        let conn = self.conn();
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();

        let count_sql = format!("SELECT COUNT(*) FROM app_logs WHERE 1=1{filters}");
        let total_count: u64 =
            conn.query_row(&count_sql, param_refs.as_slice(), |row| row.get(0))?;

        let sql = format!(
            "SELECT id, application_id, service_name, severity, message, timestamp,
                    instance_id, trace_id, user_id, source, payload
             FROM app_logs WHERE 1=1{filters}
             ORDER BY timestamp DESC LIMIT {} OFFSET {}",
            query.limit, query.offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), log_from_row)?;
        let mut logs = Vec::new();
        for row in rows {
            logs.push(finish_log(row?)?);
        }

        let has_more = (query.offset as u64 + logs.len() as u64) < total_count;
        Ok(LogQueryResult {
            logs,
            total_count,
            has_more,
        })
    }
}

#[async_trait]
impl ProbeStore for SqliteStorage {
    async fn save_probe_result(&self, result: &ProbeResult) -> Result<()> {
        let headers = serde_json::to_string(&result.response_headers)?;
        self.conn().execute(
            "INSERT INTO probe_results (id, target_id, status_code, response_time, success,
                 error, response_headers, response_body, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &result.id,
                &result.target_id,
                result.status_code,
                result.response_time,
                result.success,
                &result.error,
                headers,
                &result.response_body,
                ts_millis(result.timestamp),
            ],
        )?;
        Ok(())
    }

    async fn list_probe_results(
        &self,
        target_id: &str,
        limit: usize,
    ) -> Result<Vec<ProbeResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, target_id, status_code, response_time, success, error,
                    response_headers, response_body, timestamp
             FROM probe_results WHERE target_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![target_id, limit], |row| {
            let headers: String = row.get(6)?;
            let ts_ms: i64 = row.get(8)?;
            Ok((
                ProbeResult {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    status_code: row.get(2)?,
                    response_time: row.get(3)?,
                    success: row.get(4)?,
                    error: row.get(5)?,
                    response_headers: HashMap::new(),
                    response_body: row.get(7)?,
                    timestamp: Utc::now(),
                },
                headers,
                ts_ms,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (mut result, headers, ts_ms) = row?;
            result.response_headers = serde_json::from_str(&headers).unwrap_or_default();
            result.timestamp = from_millis("timestamp", ts_ms)?;
            results.push(result);
        }
        Ok(results)
    }

    async fn probe_summary(&self, target_id: &str, window: Duration) -> Result<ProbeSummary> {
        let cutoff = Utc::now() - chrono::Duration::from_std(window)?;
        let conn = self.conn();

        let (total, successes, avg_rt): (u64, u64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0), AVG(response_time)
             FROM probe_results WHERE target_id = ?1 AND timestamp >= ?2",
            params![target_id, ts_millis(cutoff)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let last: Option<(u16, i64)> = conn
            .query_row(
                "SELECT status_code, timestamp FROM probe_results
                 WHERE target_id = ?1 ORDER BY timestamp DESC LIMIT 1",
                params![target_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let (last_status_code, last_checked_at) = match last {
            Some((code, ms)) => (Some(code), Some(from_millis("timestamp", ms)?)),
            None => (None, None),
        };

        Ok(ProbeSummary {
            target_id: target_id.to_string(),
            total_checks: total,
            success_count: successes,
            uptime_percent: if total > 0 {
                successes as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_response_time: avg_rt.unwrap_or(0.0),
            last_status_code,
            last_checked_at,
        })
    }
}

#[async_trait]
impl TargetStore for SqliteStorage {
    async fn save_target(&self, target: &MonitoringTarget) -> Result<()> {
        let headers = serde_json::to_string(&target.headers)?;
        let expected_status = serde_json::to_string(&target.expected_status)?;
        let response_rules = serde_json::to_string(&target.response_rules)?;
        let auth = target
            .auth_config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn().execute(
            "INSERT OR REPLACE INTO monitoring_targets
                 (id, name, url, method, headers, body, frequency, timeout,
                  expected_status, response_rules, auth_config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &target.id,
                &target.name,
                &target.url,
                &target.method,
                headers,
                &target.body,
                &target.frequency,
                &target.timeout,
                expected_status,
                response_rules,
                auth,
                ts_millis(target.created_at),
                ts_millis(target.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<MonitoringTarget>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, url, method, headers, body, frequency, timeout,
                    expected_status, response_rules, auth_config, created_at, updated_at
             FROM monitoring_targets ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let headers: String = row.get(4)?;
            let expected: String = row.get(8)?;
            let rules: String = row.get(9)?;
            let auth: Option<String> = row.get(10)?;
            let created_ms: i64 = row.get(11)?;
            let updated_ms: i64 = row.get(12)?;
            Ok((
                MonitoringTarget {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                    method: row.get(3)?,
                    headers: HashMap::new(),
                    body: row.get(5)?,
                    frequency: row.get(6)?,
                    timeout: row.get(7)?,
                    expected_status: Vec::new(),
                    response_rules: serde_json::Value::Null,
                    auth_config: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                headers,
                expected,
                rules,
                auth,
                created_ms,
                updated_ms,
            ))
        })?;

        let mut targets = Vec::new();
        for row in rows {
            let (mut target, headers, expected, rules, auth, created_ms, updated_ms) = row?;
            target.headers = serde_json::from_str(&headers).map_err(StorageError::from)?;
            target.expected_status =
                serde_json::from_str(&expected).map_err(StorageError::from)?;
            target.response_rules = serde_json::from_str(&rules).map_err(StorageError::from)?;
            target.auth_config = auth
                .map(|a| serde_json::from_str(&a))
                .transpose()
                .map_err(StorageError::from)?;
            target.created_at = from_millis("created_at", created_ms)?;
            target.updated_at = from_millis("updated_at", updated_ms)?;
            targets.push(target);
        }
        Ok(targets)
    }

    async fn delete_target(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM monitoring_targets WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl AnalysisStore for SqliteStorage {
    async fn save_analysis(&self, analysis: &AnalysisEvent) -> Result<()> {
        let details = serde_json::to_string(&analysis.details)?;
        let status = match analysis.status {
            AnalysisStatus::Active => "active",
            AnalysisStatus::Acknowledged => "acknowledged",
            AnalysisStatus::Resolved => "resolved",
        };
        self.conn().execute(
            "INSERT OR REPLACE INTO analyses
                 (id, type, severity, description, details, detected_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &analysis.id,
                analysis.kind.to_string(),
                &analysis.severity,
                &analysis.description,
                details,
                ts_millis(analysis.detected_at),
                status,
            ],
        )?;
        Ok(())
    }

    async fn list_analyses(
        &self,
        kind: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AnalysisEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, type, severity, description, details, detected_at, status
             FROM analyses WHERE (?1 = '' OR type = ?1)
             ORDER BY detected_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![kind.unwrap_or(""), limit], |row| {
            let kind_str: String = row.get(1)?;
            let details: String = row.get(4)?;
            let detected_ms: i64 = row.get(5)?;
            let status: String = row.get(6)?;
            Ok((
                row.get::<_, String>(0)?,
                kind_str,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                details,
                detected_ms,
                status,
            ))
        })?;

        let mut analyses = Vec::new();
        for row in rows {
            let (id, kind_str, severity, description, details, detected_ms, status) = row?;
            let kind: AnalysisKind = serde_json::from_value(serde_json::Value::String(
                kind_str.clone(),
            ))
            .map_err(|_| StorageError::InvalidColumn {
                column: "type",
                detail: format!("unknown analysis kind: {kind_str}"),
            })?;
            let status: AnalysisStatus = serde_json::from_value(serde_json::Value::String(
                status.clone(),
            ))
            .map_err(|_| StorageError::InvalidColumn {
                column: "status",
                detail: format!("unknown analysis status: {status}"),
            })?;
            analyses.push(AnalysisEvent {
                id,
                kind,
                severity,
                description,
                details: serde_json::from_str(&details).map_err(StorageError::from)?,
                detected_at: from_millis("detected_at", detected_ms)?,
                status,
            });
        }
        Ok(analyses)
    }
}

#[async_trait]
impl AlertStore for SqliteStorage {
    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        let details = serde_json::to_string(&alert.details)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO alerts
                 (id, type, source, source_id, severity, message, details, status,
                  created_at, updated_at, resolved_at, resolved_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &alert.id,
                &alert.kind,
                &alert.source,
                &alert.source_id,
                &alert.severity,
                &alert.message,
                details,
                status_str(alert.status),
                ts_millis(alert.created_at),
                ts_millis(alert.updated_at),
                alert.resolved_at.map(ts_millis),
                &alert.resolved_by,
            ],
        )?;
        Ok(())
    }

    async fn update_alert(&self, alert: &Alert) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE alerts SET status = ?2, updated_at = ?3, resolved_at = ?4, resolved_by = ?5
             WHERE id = ?1",
            params![
                &alert.id,
                status_str(alert.status),
                ts_millis(alert.updated_at),
                alert.resolved_at.map(ts_millis),
                &alert.resolved_by,
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound {
                entity: "alert",
                id: alert.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, type, source, source_id, severity, message, details, status,
                    created_at, updated_at, resolved_at, resolved_by
             FROM alerts WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], alert_row)?;
        match rows.next() {
            Some(row) => Ok(Some(finish_alert(row?)?)),
            None => Ok(None),
        }
    }

    async fn get_active_alerts(&self) -> Result<Vec<Alert>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, type, source, source_id, severity, message, details, status,
                    created_at, updated_at, resolved_at, resolved_by
             FROM alerts WHERE status = 'active' ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], alert_row)?;
        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(finish_alert(row?)?);
        }
        Ok(alerts)
    }
}

fn status_str(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Active => "active",
        AlertStatus::Resolved => "resolved",
    }
}

type AlertRow = (Alert, String, String, i64, i64, Option<i64>);

fn alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRow> {
    let details: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_ms: i64 = row.get(8)?;
    let updated_ms: i64 = row.get(9)?;
    let resolved_ms: Option<i64> = row.get(10)?;
    Ok((
        Alert {
            id: row.get(0)?,
            kind: row.get(1)?,
            source: row.get(2)?,
            source_id: row.get(3)?,
            severity: row.get(4)?,
            message: row.get(5)?,
            details: serde_json::Value::Null,
            status: AlertStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
            resolved_by: row.get(11)?,
        },
        details,
        status,
        created_ms,
        updated_ms,
        resolved_ms,
    ))
}

fn finish_alert(
    (mut alert, details, status, created_ms, updated_ms, resolved_ms): AlertRow,
) -> Result<Alert, StorageError> {
    alert.details = serde_json::from_str(&details)?;
    alert.status = match status.as_str() {
        "active" => AlertStatus::Active,
        "resolved" => AlertStatus::Resolved,
        other => {
            return Err(StorageError::InvalidColumn {
                column: "status",
                detail: format!("unknown alert status: {other}"),
            })
        }
    };
    alert.created_at = from_millis("created_at", created_ms)?;
    alert.updated_at = from_millis("updated_at", updated_ms)?;
    alert.resolved_at = resolved_ms.map(|ms| from_millis("resolved_at", ms)).transpose()?;
    Ok(alert)
}
