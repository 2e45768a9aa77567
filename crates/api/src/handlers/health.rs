use super::{ok, ApiResult};
use crate::App;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;

pub async fn root() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "service": "docket",
        "status": "ok",
    }))
}

pub async fn health(State(app): State<Arc<App>>) -> ApiResult<serde_json::Value> {
    ok(serde_json::json!({
        "status": "ok",
        "uptime_seconds": (chrono::Utc::now() - app.started_at).num_seconds(),
    }))
}

/// Deep health: probes storage and the index. Degraded dependencies turn
/// the response into a 503 without failing user requests elsewhere.
pub async fn detailed(State(app): State<Arc<App>>) -> impl IntoResponse {
    let storage_health = app.pipeline.storage().health().await;
    let index_healthy = app.pipeline.index().is_healthy().await;
    let status = app.pipeline.status();

    let healthy = storage_health.healthy && index_healthy;
    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "storage": storage_health,
        "index_healthy": index_healthy,
        "pipeline": status,
    });

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, axum::Json(models::ApiResponse::ok(body)))
}

pub async fn ready(State(app): State<Arc<App>>) -> impl IntoResponse {
    if app.pipeline.status().running {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

pub async fn metrics(State(app): State<Arc<App>>) -> impl IntoResponse {
    (StatusCode::OK, app.prometheus.render())
}
