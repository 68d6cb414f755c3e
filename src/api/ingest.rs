use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::services::intake::{self, IngestRequest};
use crate::services::query::{self, LogFilter, PageParams};
use crate::AppState;

/// POST /logs - accept a batch of log records from an agent.
pub async fn ingest_logs(
    State(state): State<AppState>,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client_id = payload.client_id.clone();
    let receipt = state
        .with_deadline(intake::ingest(&state.db, payload))
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} logs processed successfully", receipt.accepted),
        "clientId": client_id,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub level: Option<String>,
    pub client_id: Option<String>,
    pub component: Option<String>,
}

/// GET /logs - filtered, paginated log retrieval for dashboards.
pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = LogFilter {
        level: params.level,
        client_id: params.client_id,
        component: params.component,
    };
    let page = PageParams::normalized(params.page, params.limit);

    let result = state
        .with_deadline(query::query_logs(&state.db, &filter, page))
        .await?;
    Ok(Json(result))
}
