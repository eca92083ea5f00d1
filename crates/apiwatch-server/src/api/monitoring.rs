use crate::api::storage_error;
use crate::state::AppState;
use apiwatch_storage::{AlertStore, ProbeStore, TargetStore};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_SUMMARY_WINDOW: Duration = Duration::from_secs(24 * 3600);

pub async fn list_targets(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list_targets().await {
        Ok(targets) => Json(targets).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultsParams {
    pub limit: Option<usize>,
}

pub async fn target_results(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    Query(params): Query<ResultsParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(50).min(500);
    match state.storage.list_probe_results(&target_id, limit).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

pub async fn target_summary(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> impl IntoResponse {
    match state
        .storage
        .probe_summary(&target_id, DEFAULT_SUMMARY_WINDOW)
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

pub async fn dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let targets = match state.storage.list_targets().await {
        Ok(targets) => targets,
        Err(e) => return storage_error(e).into_response(),
    };

    let mut summaries = Vec::with_capacity(targets.len());
    for target in &targets {
        match state
            .storage
            .probe_summary(&target.id, DEFAULT_SUMMARY_WINDOW)
            .await
        {
            Ok(summary) => summaries.push(serde_json::json!({
                "target_id": target.id,
                "name": target.name,
                "url": target.url,
                "summary": summary,
            })),
            Err(e) => return storage_error(e).into_response(),
        }
    }

    let active_alerts = match state.storage.get_active_alerts().await {
        Ok(alerts) => alerts,
        Err(e) => return storage_error(e).into_response(),
    };
    let groups = state.correlation.get_active_groups();

    Json(serde_json::json!({
        "targets": summaries,
        "active_alert_count": active_alerts.len(),
        "alert_groups": groups,
        "uptime_since": state.start_time.to_rfc3339(),
    }))
    .into_response()
}
