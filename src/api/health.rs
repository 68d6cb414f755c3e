use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::AppState;

/// GET /health - liveness probe; reports store reachability.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": Utc::now().to_rfc3339(),
                "database": "connected",
            })),
        ),
        Err(err) => {
            tracing::error!("health check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "timestamp": Utc::now().to_rfc3339(),
                    "database": "disconnected",
                })),
            )
        }
    }
}
