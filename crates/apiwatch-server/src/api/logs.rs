use crate::api::storage_error;
use crate::state::AppState;
use apiwatch_storage::{LogQuery, LogStore};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub async fn ingest_log(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> impl IntoResponse {
    match state.ingester.ingest(raw) {
        Ok(()) => {
            state.metrics.logs_ingested_total.inc();
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({"status": "accepted"})),
            )
        }
        Err(e) => {
            state.metrics.logs_rejected_total.inc();
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogQueryParams {
    pub application_id: Option<String>,
    pub service_name: Option<String>,
    pub severity: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> impl IntoResponse {
    let query = LogQuery {
        application_id: params.application_id,
        service_name: params.service_name,
        severity: params.severity,
        start: params.start,
        end: params.end,
        limit: params.limit.unwrap_or(100).min(1000),
        offset: params.offset.unwrap_or(0),
    };

    match state.storage.query_logs(&query).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}
