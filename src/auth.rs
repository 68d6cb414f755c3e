use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Credential gate applied before any core operation runs. Preflight
/// requests pass through so the CORS layer can answer them; when no key is
/// configured the gate is open.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided == Some(expected) {
        next.run(request).await
    } else {
        tracing::warn!("rejected request with missing or invalid api key");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response()
    }
}
