use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the core pipeline. Auth and rate limiting are handled
/// before a request reaches the core, so they have no variant here; absence
/// (unknown client, empty window) is an empty result, not an error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed ({} issues)", .0.len())]
    Validation(Vec<String>),
    #[error("store error: {0}")]
    Store(#[from] sea_orm::DbErr),
    #[error("operation exceeded its deadline")]
    Timeout,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Validation Error",
                    "details": details,
                })),
            )
                .into_response(),
            ApiError::Store(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal Server Error" })),
                )
                    .into_response()
            }
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "error": "Timeout",
                    "message": "operation exceeded its deadline",
                })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_counts_issues() {
        let err = ApiError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "validation failed (2 issues)");
    }
}
