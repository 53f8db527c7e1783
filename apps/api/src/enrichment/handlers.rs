use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use crate::enrichment::cache::{enrich_all_for_version, enrich_entity, EnrichmentBatchSummary};
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::entity::EnrichmentRow;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EnrichQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

/// POST /api/v1/entities/:id/enrich
pub async fn handle_enrich_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<Uuid>,
    Query(params): Query<EnrichQuery>,
) -> Result<Json<EnrichmentRow>, AppError> {
    let row = enrich_entity(
        &state.db,
        state.enricher.as_ref(),
        entity_id,
        params.force_refresh,
    )
    .await?;
    Ok(Json(row))
}

/// POST /api/v1/versions/:id/enrich
pub async fn handle_enrich_version(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<EnrichmentBatchSummary>, AppError> {
    let summary = enrich_all_for_version(&state.db, state.enricher.as_ref(), version_id).await?;
    Ok(Json(summary))
}
