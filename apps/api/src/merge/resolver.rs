//! Merge resolver: records accept/reject/override rulings on diffs and
//! applies them to the confirmed profile. Recording and applying are
//! separate steps; applying is idempotent because every profile write is an
//! upsert by the natural composite key.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::diff::{DecisionRow, DecisionType, DiffRow};
use crate::models::entity::EntityRow;
use crate::models::profile::{is_known_entity_type, ProvenanceSource};

pub struct RecordDecisionParams {
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub owner_id: Uuid,
    pub decision_type: DecisionType,
    pub override_value: Option<Value>,
    pub justification: Option<String>,
}

/// The logical profile entity id for a dotted field name: the prefix up to
/// the last segment. `work_experience.0.title` -> `work_experience.0`;
/// an undotted name is its own logical id.
pub fn logical_entity_id(field_name: &str) -> &str {
    field_name.rsplit_once('.').map(|(head, _)| head).unwrap_or(field_name)
}

/// What an applied decision writes to the confirmed profile, if anything.
/// Reject writes nothing. Override is maximally trusted: confidence 1.0,
/// and the snapshotted parsed value stands in when no override value was
/// recorded.
pub fn merge_write(
    decision_type: DecisionType,
    snapshot_value: &Value,
    snapshot_confidence: f64,
    override_value: Option<&Value>,
) -> Option<(Value, f64, ProvenanceSource)> {
    match decision_type {
        DecisionType::Accept => Some((
            snapshot_value.clone(),
            snapshot_confidence,
            ProvenanceSource::MergeAccepted,
        )),
        DecisionType::Override => Some((
            override_value.cloned().unwrap_or_else(|| snapshot_value.clone()),
            1.0,
            ProvenanceSource::MergeOverridden,
        )),
        DecisionType::Reject => None,
    }
}

/// Everything applying one decision will do, computed before any write.
#[derive(Debug, PartialEq)]
pub struct DecisionPlan {
    pub decision_type: DecisionType,
    pub write: Option<(Value, f64, ProvenanceSource)>,
}

/// Validates a stored decision and plans its profile write. Fails on an
/// unknown decision type, and on an unrecognized profile entity type when a
/// write would happen — the profile_entries column is free TEXT, so a
/// malformed key would otherwise become a stray profile row instead of an
/// error. Rejects write nothing and so need no key.
pub fn plan_decision(decision: &DecisionRow) -> Result<DecisionPlan, AppError> {
    let decision_type = DecisionType::parse(&decision.decision_type).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown decision type '{}' on decision {}",
            decision.decision_type, decision.id
        ))
    })?;

    let write = merge_write(
        decision_type,
        &decision.snapshot_value,
        decision.snapshot_confidence,
        decision.override_value.as_ref(),
    );

    if write.is_some() && !is_known_entity_type(&decision.profile_entity_type) {
        return Err(AppError::Validation(format!(
            "Unknown profile entity type '{}' on decision {}",
            decision.profile_entity_type, decision.id
        )));
    }

    Ok(DecisionPlan {
        decision_type,
        write,
    })
}

/// Appends one decision with the entity's current value and confidence
/// snapshotted, so later re-extraction cannot change what was decided.
pub async fn record_decision(
    pool: &PgPool,
    params: RecordDecisionParams,
) -> Result<DecisionRow, AppError> {
    if params.decision_type == DecisionType::Override && params.override_value.is_none() {
        return Err(AppError::Validation(
            "Override decisions must carry an override value".into(),
        ));
    }

    let entity: Option<EntityRow> =
        sqlx::query_as("SELECT * FROM entities WHERE id = $1 AND version_id = $2")
            .bind(params.entity_id)
            .bind(params.version_id)
            .fetch_optional(pool)
            .await?;
    let entity = entity.ok_or_else(|| {
        AppError::NotFound(format!(
            "Entity {} not found in version {}",
            params.entity_id, params.version_id
        ))
    })?;

    // The profile key comes from the diff's matched entry when one exists,
    // otherwise it is derived from the dotted field name.
    let diff: Option<DiffRow> =
        sqlx::query_as("SELECT * FROM diffs WHERE version_id = $1 AND entity_id = $2")
            .bind(params.version_id)
            .bind(params.entity_id)
            .fetch_optional(pool)
            .await?;

    let (profile_entity_type, profile_entity_id) = match diff
        .as_ref()
        .and_then(|d| d.matched_entity_type.clone().zip(d.matched_entity_id.clone()))
    {
        Some(key) => key,
        None => (
            crate::diffing::engine::entity_type_prefix(&entity.field_name).to_string(),
            logical_entity_id(&entity.field_name).to_string(),
        ),
    };

    let decision: DecisionRow = sqlx::query_as(
        r#"
        INSERT INTO decisions
            (id, version_id, entity_id, owner_id, decision_type, override_value,
             snapshot_value, snapshot_confidence, profile_entity_type,
             profile_entity_id, field_name, justification)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(params.version_id)
    .bind(params.entity_id)
    .bind(params.owner_id)
    .bind(params.decision_type.as_str())
    .bind(params.override_value)
    .bind(&entity.value)
    .bind(entity.confidence)
    .bind(&profile_entity_type)
    .bind(&profile_entity_id)
    .bind(&entity.field_name)
    .bind(params.justification.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(decision)
}

#[derive(Debug, Serialize)]
pub struct DecisionResult {
    pub decision_id: Uuid,
    pub entity_id: Uuid,
    pub decision_type: String,
    pub applied: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplySummary {
    pub version_id: Uuid,
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub overridden: usize,
    pub failed: usize,
    pub results: Vec<DecisionResult>,
}

/// Applies every recorded decision for (version, owner) in creation order,
/// oldest first. Each decision is applied independently; a failure is
/// captured in its result entry and never aborts the batch.
pub async fn apply_decisions(
    pool: &PgPool,
    version_id: Uuid,
    owner_id: Uuid,
) -> Result<ApplySummary, AppError> {
    let decisions: Vec<DecisionRow> = sqlx::query_as(
        "SELECT * FROM decisions WHERE version_id = $1 AND owner_id = $2 ORDER BY created_at ASC",
    )
    .bind(version_id)
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let mut accepted = 0;
    let mut rejected = 0;
    let mut overridden = 0;
    let mut results = Vec::with_capacity(decisions.len());

    for decision in &decisions {
        let outcome = apply_one(pool, decision).await;
        match &outcome {
            Ok(DecisionType::Accept) => accepted += 1,
            Ok(DecisionType::Reject) => rejected += 1,
            Ok(DecisionType::Override) => overridden += 1,
            Err(e) => {
                warn!("Decision {} failed to apply: {e}", decision.id);
            }
        }
        results.push(DecisionResult {
            decision_id: decision.id,
            entity_id: decision.entity_id,
            decision_type: decision.decision_type.clone(),
            applied: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
        });
    }

    let failed = results.iter().filter(|r| !r.applied).count();
    info!(
        "Applied decisions for version {version_id}: {accepted} accepted, \
         {rejected} rejected, {overridden} overridden, {failed} failed"
    );

    Ok(ApplySummary {
        version_id,
        total: decisions.len(),
        accepted,
        rejected,
        overridden,
        failed,
        results,
    })
}

async fn apply_one(pool: &PgPool, decision: &DecisionRow) -> Result<DecisionType, AppError> {
    let plan = plan_decision(decision)?;

    if let Some((value, confidence, source)) = plan.write {
        sqlx::query(
            r#"
            INSERT INTO profile_entries
                (id, owner_id, entity_type, entity_id, field_name,
                 confirmed_value, confidence, source, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            ON CONFLICT (owner_id, entity_type, entity_id, field_name) DO UPDATE SET
                confirmed_value = EXCLUDED.confirmed_value,
                confidence = EXCLUDED.confidence,
                source = EXCLUDED.source,
                confirmed_at = now()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(decision.owner_id)
        .bind(&decision.profile_entity_type)
        .bind(&decision.profile_entity_id)
        .bind(&decision.field_name)
        .bind(&value)
        .bind(confidence)
        .bind(source.as_str())
        .execute(pool)
        .await?;
    }

    // Every outcome, reject included, resolves the diff so it stops showing
    // in pending-review views.
    let resolution = json!({
        "resolved_at": Utc::now(),
        "resolved_by": decision.owner_id,
        "decision_type": decision.decision_type,
        "decision_id": decision.id,
    });
    sqlx::query(
        r#"
        UPDATE diffs SET requires_review = FALSE, resolution = $1, updated_at = now()
        WHERE version_id = $2 AND entity_id = $3
        "#,
    )
    .bind(resolution)
    .bind(decision.version_id)
    .bind(decision.entity_id)
    .execute(pool)
    .await?;

    Ok(plan.decision_type)
}
