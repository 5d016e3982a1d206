//! Analyze handler — batch risk classification endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;

use crate::models::RiskVerdict;
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub risk: RiskVerdict,
}

/// Classify a batch of player profiles.
///
/// The body must be a JSON object with a `profiles` array; anything else
/// is rejected before any cohort work starts.
pub async fn analyze(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> AppResult<Json<AnalyzeResponse>> {
    let Some(Json(body)) = body else {
        return Err(AppError::InvalidInput("No data provided".to_string()));
    };
    let Some(profiles) = body.get("profiles").and_then(Value::as_array) else {
        return Err(AppError::InvalidInput("No data provided".to_string()));
    };

    let risk = state.pipeline.analyze(profiles).await?;
    Ok(Json(AnalyzeResponse { risk }))
}
