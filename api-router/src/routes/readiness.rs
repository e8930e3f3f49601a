use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 if the retrieval engine answers, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.engine.health().await {
        Ok(health) if health.is_healthy() => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "engine": "ok" },
                "wiring_mismatches": health.wiring_mismatches,
            })),
        ),
        Ok(health) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "engine": "fail" },
                "reason": format!("engine reported status '{}'", health.status),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "engine": "fail" },
                "reason": e.to_string()
            })),
        ),
    }
}
