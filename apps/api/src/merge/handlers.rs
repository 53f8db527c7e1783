use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::extractors::{Json, Path};
use crate::merge::resolver::{apply_decisions, record_decision, ApplySummary, RecordDecisionParams};
use crate::models::diff::{DecisionRow, DecisionType};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RecordDecisionRequest {
    pub entity_id: Uuid,
    pub owner_id: Uuid,
    pub decision_type: DecisionType,
    pub override_value: Option<Value>,
    pub justification: Option<String>,
}

/// POST /api/v1/versions/:id/decisions
pub async fn handle_record_decision(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
    Json(req): Json<RecordDecisionRequest>,
) -> Result<Json<DecisionRow>, AppError> {
    let decision = record_decision(
        &state.db,
        RecordDecisionParams {
            version_id,
            entity_id: req.entity_id,
            owner_id: req.owner_id,
            decision_type: req.decision_type,
            override_value: req.override_value,
            justification: req.justification,
        },
    )
    .await?;
    Ok(Json(decision))
}

#[derive(Deserialize)]
pub struct ApplyDecisionsRequest {
    pub owner_id: Uuid,
}

/// POST /api/v1/versions/:id/decisions/apply
pub async fn handle_apply_decisions(
    State(state): State<AppState>,
    Path(version_id): Path<Uuid>,
    Json(req): Json<ApplyDecisionsRequest>,
) -> Result<Json<ApplySummary>, AppError> {
    let summary = apply_decisions(&state.db, version_id, req.owner_id).await?;
    Ok(Json(summary))
}
