use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::analytics::{self, Timeframe};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    // older dashboards send timeRange
    #[serde(alias = "timeRange")]
    pub timeframe: Option<String>,
}

/// GET /dashboard - the summary/distribution/timeline/top-clients bundle.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = Timeframe::parse(params.timeframe.as_deref());
    let report = state
        .with_deadline(analytics::dashboard(&state.db, timeframe))
        .await?;
    Ok(Json(report))
}
