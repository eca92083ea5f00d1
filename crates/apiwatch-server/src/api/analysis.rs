use crate::api::storage_error;
use crate::state::AppState;
use apiwatch_analysis::anomaly::TimeSeriesPoint;
use apiwatch_common::types::AnalysisKind;
use apiwatch_storage::{AnalysisStore, ProbeStore, TargetStore};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

pub async fn anomalies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(100).min(500);
    match state.storage.list_analyses(None, limit).await {
        Ok(analyses) => {
            let anomalies: Vec<_> = analyses
                .into_iter()
                .filter(|a| a.kind != AnalysisKind::ErrorPattern)
                .collect();
            Json(anomalies).into_response()
        }
        Err(e) => storage_error(e).into_response(),
    }
}

pub async fn error_clusters(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(100).min(500);
    match state.storage.list_analyses(Some("error_pattern"), limit).await {
        Ok(clusters) => Json(clusters).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// Runs the ensemble detector over each target's recent probe latencies.
pub async fn trends(State(state): State<AppState>) -> impl IntoResponse {
    let targets = match state.storage.list_targets().await {
        Ok(targets) => targets,
        Err(e) => return storage_error(e).into_response(),
    };

    let mut trends = Vec::with_capacity(targets.len());
    for target in &targets {
        let results = match state.storage.list_probe_results(&target.id, 200).await {
            Ok(results) => results,
            Err(e) => return storage_error(e).into_response(),
        };

        // stored newest-first; the detector wants chronological order
        let points: Vec<TimeSeriesPoint> = results
            .iter()
            .rev()
            .map(|r| TimeSeriesPoint {
                timestamp: r.timestamp,
                value: r.response_time,
            })
            .collect();

        let events = state
            .analyzer
            .detect_latency_anomalies(&target.id, &points);

        trends.push(serde_json::json!({
            "target_id": target.id,
            "samples": points.len(),
            "latency_anomalies": events.len(),
            "events": events,
        }));
    }

    Json(trends).into_response()
}
