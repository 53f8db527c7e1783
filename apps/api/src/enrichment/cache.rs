//! Per-entity enrichment cache. A live enrichment short-circuits repeated
//! requests; `force_refresh` replaces it in place under the same identity.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::enrichment::service::{EnrichmentPayload, EnrichmentService};
use crate::errors::AppError;
use crate::models::document::ProcessingStatus;
use crate::models::entity::{EnrichmentRow, EntityRow};
use crate::processing::set_status;

/// In-flight collaborator calls per batch. Bounded fan-out, not unbounded
/// spawn: the collaborator rate-limits long before Postgres does.
const ENRICHMENT_FANOUT: usize = 4;

/// True when a live enrichment can be returned without a collaborator call.
pub fn is_cache_hit(existing: Option<&EnrichmentRow>, force_refresh: bool) -> bool {
    existing.is_some() && !force_refresh
}

/// What the cache consultation produced for one entity.
#[derive(Debug)]
pub enum EnrichmentOutcome {
    /// The live row satisfied the request; no collaborator call happened.
    Cached(EnrichmentRow),
    /// The collaborator produced a fresh payload the caller must persist.
    Fresh(EnrichmentPayload),
}

/// The cache decision for one entity, free of storage concerns: a hit
/// returns the live row without touching the collaborator, anything else
/// calls it exactly once. A forced refresh is never silently skipped.
pub async fn fetch_or_enrich(
    service: &dyn EnrichmentService,
    existing: Option<EnrichmentRow>,
    field_name: &str,
    value: &str,
    force_refresh: bool,
) -> Result<EnrichmentOutcome, AppError> {
    match existing {
        Some(row) if is_cache_hit(Some(&row), force_refresh) => Ok(EnrichmentOutcome::Cached(row)),
        _ => {
            let payload = service.enrich(field_name, value).await?;
            Ok(EnrichmentOutcome::Fresh(payload))
        }
    }
}

/// Returns the entity's enrichment, calling the collaborator only on a cache
/// miss or a forced refresh.
pub async fn enrich_entity(
    pool: &PgPool,
    service: &dyn EnrichmentService,
    entity_id: Uuid,
    force_refresh: bool,
) -> Result<EnrichmentRow, AppError> {
    let entity: Option<EntityRow> = sqlx::query_as("SELECT * FROM entities WHERE id = $1")
        .bind(entity_id)
        .fetch_optional(pool)
        .await?;
    let entity =
        entity.ok_or_else(|| AppError::NotFound(format!("Entity {entity_id} not found")))?;

    let existing: Option<EnrichmentRow> =
        sqlx::query_as("SELECT * FROM enrichments WHERE entity_id = $1")
            .bind(entity_id)
            .fetch_optional(pool)
            .await?;

    let value_text = entity.field_value().as_text().into_owned();
    match fetch_or_enrich(service, existing, &entity.field_name, &value_text, force_refresh).await? {
        EnrichmentOutcome::Cached(row) => Ok(row),
        EnrichmentOutcome::Fresh(payload) => {
            upsert_enrichment(pool, &entity, &payload, service.model_id()).await
        }
    }
}

async fn upsert_enrichment(
    pool: &PgPool,
    entity: &EntityRow,
    payload: &EnrichmentPayload,
    model_id: &str,
) -> Result<EnrichmentRow, AppError> {
    let row: EnrichmentRow = sqlx::query_as(
        r#"
        INSERT INTO enrichments
            (id, entity_id, version_id, insights, skills, experience_level,
             career_progression, market_relevance, recommendations, confidence,
             model, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (entity_id) DO UPDATE SET
            insights = EXCLUDED.insights,
            skills = EXCLUDED.skills,
            experience_level = EXCLUDED.experience_level,
            career_progression = EXCLUDED.career_progression,
            market_relevance = EXCLUDED.market_relevance,
            recommendations = EXCLUDED.recommendations,
            confidence = EXCLUDED.confidence,
            model = EXCLUDED.model,
            metadata = EXCLUDED.metadata,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entity.id)
    .bind(entity.version_id)
    .bind(&payload.insights)
    .bind(&payload.skills)
    .bind(payload.experience_level.as_deref())
    .bind(payload.career_progression.as_deref())
    .bind(payload.market_relevance.as_deref())
    .bind(&payload.recommendations)
    .bind(payload.confidence)
    .bind(model_id)
    .bind(json!({ "field_name": entity.field_name }))
    .fetch_one(pool)
    .await?;

    Ok(row)
}

#[derive(Debug, Serialize)]
pub struct EnrichmentFailure {
    pub entity_id: Uuid,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct EnrichmentBatchSummary {
    pub version_id: Uuid,
    pub total_entities: usize,
    pub already_enriched: usize,
    pub enriched: usize,
    pub failures: Vec<EnrichmentFailure>,
}

/// Calls the collaborator for each entity with bounded concurrency. Pure
/// fan-out, no persistence: one entity's failure lands in its own slot and
/// never aborts its siblings.
pub async fn enrich_batch(
    service: &dyn EnrichmentService,
    entities: Vec<EntityRow>,
) -> Vec<(EntityRow, Result<EnrichmentPayload, AppError>)> {
    stream::iter(entities.into_iter().map(|entity| async move {
        let value_text = entity.field_value().as_text().into_owned();
        let outcome = service.enrich(&entity.field_name, &value_text).await;
        (entity, outcome)
    }))
    .buffer_unordered(ENRICHMENT_FANOUT)
    .collect()
    .await
}

/// Enriches every entity of the version that lacks a live enrichment, with
/// bounded concurrency. One entity's failure is captured in the summary and
/// never aborts its siblings; callers must inspect `failures`.
pub async fn enrich_all_for_version(
    pool: &PgPool,
    service: &dyn EnrichmentService,
    version_id: Uuid,
) -> Result<EnrichmentBatchSummary, AppError> {
    let total_entities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE version_id = $1")
        .bind(version_id)
        .fetch_one(pool)
        .await?;

    // Set difference: entities without a live enrichment.
    let pending: Vec<EntityRow> = sqlx::query_as(
        r#"
        SELECT e.* FROM entities e
        LEFT JOIN enrichments en ON en.entity_id = e.id
        WHERE e.version_id = $1 AND en.id IS NULL
        ORDER BY e.field_name ASC
        "#,
    )
    .bind(version_id)
    .fetch_all(pool)
    .await?;

    let already_enriched = total_entities as usize - pending.len();

    let results = enrich_batch(service, pending).await;

    let mut enriched = 0;
    let mut failures = Vec::new();
    for (entity, outcome) in results {
        // A failed upsert counts against the entity the same as a failed
        // collaborator call.
        let stored = match outcome {
            Ok(payload) => upsert_enrichment(pool, &entity, &payload, service.model_id())
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        match stored {
            Ok(()) => enriched += 1,
            Err(e) => {
                warn!("Enrichment failed for entity {}: {e}", entity.id);
                failures.push(EnrichmentFailure {
                    entity_id: entity.id,
                    error: e.to_string(),
                });
            }
        }
    }

    // Every entity carries a live enrichment now -> the version is done.
    if failures.is_empty() && total_entities > 0 {
        set_status(pool, version_id, ProcessingStatus::Complete, Some(100)).await?;
    } else {
        set_status(pool, version_id, ProcessingStatus::Processing, Some(70)).await?;
    }

    info!(
        "Enrichment batch for version {version_id}: {enriched} enriched, \
         {already_enriched} cached, {} failed",
        failures.len()
    );

    Ok(EnrichmentBatchSummary {
        version_id,
        total_entities: total_entities as usize,
        already_enriched,
        enriched,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn make_enrichment_row() -> EnrichmentRow {
        EnrichmentRow {
            id: Uuid::new_v4(),
            entity_id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
            insights: vec!["insight".to_string()],
            skills: vec!["rust".to_string()],
            experience_level: Some("senior".to_string()),
            career_progression: Some("steady growth".to_string()),
            market_relevance: None,
            recommendations: vec![],
            confidence: 0.9,
            model: "test-model".to_string(),
            metadata: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_live_enrichment_without_force_is_a_hit() {
        let row = make_enrichment_row();
        assert!(is_cache_hit(Some(&row), false));
    }

    #[test]
    fn test_force_refresh_is_never_a_hit() {
        let row = make_enrichment_row();
        assert!(!is_cache_hit(Some(&row), true));
    }

    #[test]
    fn test_missing_enrichment_is_a_miss() {
        assert!(!is_cache_hit(None, false));
        assert!(!is_cache_hit(None, true));
    }

    fn make_entity(field_name: &str) -> EntityRow {
        EntityRow {
            id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
            field_name: field_name.to_string(),
            value: json!({"kind": "text", "value": "Senior Engineer"}),
            confidence: 0.9,
            extractor_model: "stub-model".to_string(),
            created_at: Utc::now(),
        }
    }

    fn make_payload() -> EnrichmentPayload {
        EnrichmentPayload {
            insights: vec!["strong backend focus".to_string()],
            skills: vec!["rust".to_string()],
            experience_level: Some("senior".to_string()),
            career_progression: None,
            market_relevance: None,
            recommendations: vec![],
            confidence: 0.8,
        }
    }

    struct CountingEnricher {
        calls: AtomicUsize,
        fail_field: Option<&'static str>,
    }

    impl CountingEnricher {
        fn new(fail_field: Option<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_field,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EnrichmentService for CountingEnricher {
        async fn enrich(
            &self,
            field_name: &str,
            _value: &str,
        ) -> Result<EnrichmentPayload, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_field == Some(field_name) {
                return Err(AppError::Llm(format!(
                    "enrichment unavailable for '{field_name}'"
                )));
            }
            Ok(make_payload())
        }

        fn model_id(&self) -> &str {
            "stub-model"
        }
    }

    #[tokio::test]
    async fn test_cached_row_costs_zero_collaborator_calls() {
        let service = CountingEnricher::new(None);

        // First request misses and calls the collaborator once.
        let outcome = fetch_or_enrich(&service, None, "skills.0", "rust", false)
            .await
            .unwrap();
        assert!(matches!(outcome, EnrichmentOutcome::Fresh(_)));
        assert_eq!(service.call_count(), 1);

        // Second request finds the live row; no further calls.
        let row = make_enrichment_row();
        let outcome = fetch_or_enrich(&service, Some(row), "skills.0", "rust", false)
            .await
            .unwrap();
        assert!(matches!(outcome, EnrichmentOutcome::Cached(_)));
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_calls_despite_live_row() {
        let service = CountingEnricher::new(None);
        let row = make_enrichment_row();

        let outcome = fetch_or_enrich(&service, Some(row), "skills.0", "rust", true)
            .await
            .unwrap();
        assert!(matches!(outcome, EnrichmentOutcome::Fresh(_)));
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_isolates_one_failing_entity() {
        let service = CountingEnricher::new(Some("education.0.degree"));
        let entities = vec![
            make_entity("work_experience.0.title"),
            make_entity("work_experience.1.title"),
            make_entity("education.0.degree"),
            make_entity("skills.0"),
            make_entity("summary"),
        ];

        let results = enrich_batch(&service, entities).await;

        assert_eq!(results.len(), 5);
        assert_eq!(service.call_count(), 5);

        let failed: Vec<_> = results
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0.field_name, "education.0.degree");
        assert_eq!(
            results.iter().filter(|(_, o)| o.is_ok()).count(),
            4
        );
    }
}
