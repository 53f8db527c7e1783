use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use crate::diffing::engine::{analyze_version, list_diffs, DiffSummary};
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::diff::DiffRow;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub owner_id: Uuid,
}

#[derive(Deserialize)]
pub struct ListDiffsQuery {
    #[serde(default)]
    pub pending_only: bool,
}

/// POST /api/v1/versions/:id/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<DiffSummary>, AppError> {
    let summary = analyze_version(
        &state.db,
        state.comparator.as_ref(),
        version_id,
        req.owner_id,
    )
    .await?;
    Ok(Json(summary))
}

/// GET /api/v1/versions/:id/diffs
pub async fn handle_list_diffs(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
    Query(params): Query<ListDiffsQuery>,
) -> Result<Json<Vec<DiffRow>>, AppError> {
    Ok(Json(
        list_diffs(&state.db, version_id, params.pending_only).await?,
    ))
}
