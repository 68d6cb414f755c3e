use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::analytics::{self, Timeframe};
use crate::services::query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsParams {
    pub timeframe: Option<String>,
    pub limit: Option<u64>,
    pub include_inactive: Option<bool>,
}

/// GET /clients - the fleet view with per-client aggregated stats.
pub async fn list_clients(
    State(state): State<AppState>,
    Query(params): Query<ClientsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = Timeframe::parse(params.timeframe.as_deref());
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let include_inactive = params.include_inactive.unwrap_or(false);

    let report = state
        .with_deadline(analytics::client_stats(
            &state.db,
            timeframe,
            limit,
            include_inactive,
        ))
        .await?;
    Ok(Json(report))
}
