use crate::api::storage_error;
use crate::state::AppState;
use apiwatch_storage::AlertStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

pub async fn active_alerts(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.get_active_alerts().await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> impl IntoResponse {
    match state
        .alert_manager
        .resolve_alert(&alert_id, &request.resolved_by)
        .await
    {
        Ok(()) => Json(serde_json::json!({"status": "resolved"})).into_response(),
        Err(e) if e.to_string().contains("not found") => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

pub async fn active_groups(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.correlation.get_active_groups())
}

pub async fn resolve_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> impl IntoResponse {
    match state.correlation.resolve_group(&group_id) {
        Ok(()) => Json(serde_json::json!({"status": "resolved"})).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
