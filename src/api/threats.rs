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
pub struct ThreatsParams {
    pub timeframe: Option<String>,
}

/// GET /threats - keyword patterns and critical-entry analysis.
pub async fn get_threats(
    State(state): State<AppState>,
    Query(params): Query<ThreatsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = Timeframe::parse(params.timeframe.as_deref());
    let report = state
        .with_deadline(analytics::threats(
            &state.db,
            &state.threat_patterns,
            timeframe,
        ))
        .await?;
    Ok(Json(report))
}
