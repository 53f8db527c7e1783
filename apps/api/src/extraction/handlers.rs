use axum::extract::State;
use uuid::Uuid;

use crate::errors::AppError;
use crate::extractors::{Json, Path};
use crate::extraction::pipeline::{list_entities, run_extraction, ExtractionOutcome};
use crate::models::entity::EntityRow;
use crate::processing::{get_processing_status, StatusReport};
use crate::state::AppState;

/// POST /api/v1/versions/:id/extract
pub async fn handle_extract(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<ExtractionOutcome>, AppError> {
    let outcome = run_extraction(
        &state.db,
        &state.s3,
        &state.config.s3_bucket,
        state.extractor.as_ref(),
        version_id,
    )
    .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/versions/:id/entities
pub async fn handle_list_entities(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<Vec<EntityRow>>, AppError> {
    Ok(Json(list_entities(&state.db, version_id).await?))
}

/// GET /api/v1/versions/:id/status
pub async fn handle_status(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<StatusReport>, AppError> {
    Ok(Json(get_processing_status(&state.db, version_id).await?))
}
