use crate::api;
use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

pub fn build_http_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(
            "/api/v1/app-logs",
            post(api::logs::ingest_log).get(api::logs::query_logs),
        )
        .route(
            "/api/v1/external-monitoring/targets",
            get(api::monitoring::list_targets),
        )
        .route(
            "/api/v1/external-monitoring/targets/:targetId/results",
            get(api::monitoring::target_results),
        )
        .route(
            "/api/v1/external-monitoring/targets/:targetId/summary",
            get(api::monitoring::target_summary),
        )
        .route(
            "/api/v1/external-monitoring/dashboard",
            get(api::monitoring::dashboard),
        )
        .route("/api/v1/alerts/active", get(api::alerts::active_alerts))
        .route(
            "/api/v1/alerts/:alertId/resolve",
            post(api::alerts::resolve_alert),
        )
        .route("/api/v1/alerts/groups", get(api::alerts::active_groups))
        .route(
            "/api/v1/alerts/groups/:groupId/resolve",
            post(api::alerts::resolve_group),
        )
        .route("/api/v1/ai-analysis/anomalies", get(api::analysis::anomalies))
        .route(
            "/api/v1/ai-analysis/error-clusters",
            get(api::analysis::error_clusters),
        )
        .route("/api/v1/ai-analysis/trends", get(api::analysis::trends))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.export()
}
