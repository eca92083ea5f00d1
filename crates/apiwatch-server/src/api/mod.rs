pub mod alerts;
pub mod analysis;
pub mod logs;
pub mod monitoring;

use axum::http::StatusCode;
use axum::Json;

/// Uniform 500 response; the cause is logged, not leaked.
pub fn storage_error(e: anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!(error = %e, "Storage error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "storage error"})),
    )
}
