//! Semantic diff engine: classifies each extracted entity against the
//! owner's confirmed profile and upserts exactly one live diff per
//! (version, entity).

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::diffing::comparator::{fallback_compare, Comparison, ComparisonService};
use crate::errors::AppError;
use crate::models::diff::{DiffRow, DiffType};
use crate::models::entity::EntityRow;
use crate::models::profile::ProfileEntryRow;
use crate::models::FieldValue;

/// Aggregate counts for one analysis run. Display data for callers, not
/// control flow.
#[derive(Debug, Serialize)]
pub struct DiffSummary {
    pub version_id: Uuid,
    pub total: usize,
    pub identical: usize,
    pub equivalent: usize,
    pub conflicting: usize,
    pub new: usize,
    pub requires_review: usize,
}

/// The entity-type prefix of a dotted field name: `work_experience.0.title`
/// -> `work_experience`.
pub fn entity_type_prefix(field_name: &str) -> &str {
    field_name.split('.').next().unwrap_or(field_name)
}

/// Candidate confirmed entries for one entity: entity-type equals the
/// field-name prefix, or field names are case-insensitive substrings of each
/// other. Callers pass entries ordered newest-confirmed first, which fixes
/// the precedence of the "first candidate".
pub fn find_candidates<'a>(
    entries: &'a [ProfileEntryRow],
    field_name: &str,
) -> Vec<&'a ProfileEntryRow> {
    let prefix = entity_type_prefix(field_name);
    let field_lower = field_name.to_lowercase();

    entries
        .iter()
        .filter(|e| {
            e.entity_type == prefix || {
                let candidate_lower = e.field_name.to_lowercase();
                candidate_lower.contains(&field_lower) || field_lower.contains(&candidate_lower)
            }
        })
        .collect()
}

/// Classification for one entity before persistence.
#[derive(Debug)]
struct EntityDiff {
    comparison: Comparison,
    matched_entity_type: Option<String>,
    matched_entity_id: Option<String>,
}

async fn classify_entity(
    comparator: &dyn ComparisonService,
    entity: &EntityRow,
    candidates: &[&ProfileEntryRow],
) -> EntityDiff {
    let Some(target) = candidates.first() else {
        return EntityDiff {
            comparison: Comparison {
                diff_type: DiffType::New,
                similarity: 0.0,
                justification: "No matching confirmed profile entry".to_string(),
                requires_review: false,
            },
            matched_entity_type: None,
            matched_entity_id: None,
        };
    };

    let extracted = entity.field_value().as_text().into_owned();
    let confirmed = FieldValue::from_stored(&target.confirmed_value)
        .as_text()
        .into_owned();

    let mut comparison = match comparator.compare(&extracted, &confirmed).await {
        Ok(c) => c,
        Err(e) => {
            warn!(
                "Comparator unavailable for entity {}, using deterministic fallback: {e}",
                entity.id
            );
            fallback_compare(&extracted, &confirmed)
        }
    };

    // Ambiguous match: the original system silently took the first candidate;
    // here a human gets to look when more than one entry matched.
    if candidates.len() > 1 {
        comparison.requires_review = true;
    }

    EntityDiff {
        comparison,
        matched_entity_type: Some(target.entity_type.clone()),
        matched_entity_id: Some(target.entity_id.clone()),
    }
}

/// Runs the diff engine over every entity of the version. Repeated runs
/// upsert by (version, entity) and reset any earlier resolution — a fresh
/// analysis reopens the diff.
pub async fn analyze_version(
    pool: &PgPool,
    comparator: &dyn ComparisonService,
    version_id: Uuid,
    owner_id: Uuid,
) -> Result<DiffSummary, AppError> {
    let entities: Vec<EntityRow> =
        sqlx::query_as("SELECT * FROM entities WHERE version_id = $1 ORDER BY field_name ASC")
            .bind(version_id)
            .fetch_all(pool)
            .await?;

    // Newest-confirmed first: fixes which candidate is "first".
    let profile: Vec<ProfileEntryRow> = sqlx::query_as(
        "SELECT * FROM profile_entries WHERE owner_id = $1 ORDER BY confirmed_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let mut counts: HashMap<DiffType, usize> = HashMap::new();
    let mut requires_review = 0;

    for entity in &entities {
        let candidates = find_candidates(&profile, &entity.field_name);
        let diff = classify_entity(comparator, entity, &candidates).await;

        *counts.entry(diff.comparison.diff_type).or_insert(0) += 1;
        if diff.comparison.requires_review {
            requires_review += 1;
        }

        upsert_diff(pool, version_id, entity, &diff).await?;
    }

    let summary = DiffSummary {
        version_id,
        total: entities.len(),
        identical: counts.get(&DiffType::Identical).copied().unwrap_or(0),
        equivalent: counts.get(&DiffType::Equivalent).copied().unwrap_or(0),
        conflicting: counts.get(&DiffType::Conflicting).copied().unwrap_or(0),
        new: counts.get(&DiffType::New).copied().unwrap_or(0),
        requires_review,
    };

    info!(
        "Analyzed version {version_id}: {} diffs, {} need review",
        summary.total, summary.requires_review
    );
    Ok(summary)
}

async fn upsert_diff(
    pool: &PgPool,
    version_id: Uuid,
    entity: &EntityRow,
    diff: &EntityDiff,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO diffs
            (id, version_id, entity_id, matched_entity_type, matched_entity_id,
             diff_type, similarity, confidence, justification, requires_review,
             resolution)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL)
        ON CONFLICT (version_id, entity_id) DO UPDATE SET
            matched_entity_type = EXCLUDED.matched_entity_type,
            matched_entity_id = EXCLUDED.matched_entity_id,
            diff_type = EXCLUDED.diff_type,
            similarity = EXCLUDED.similarity,
            confidence = EXCLUDED.confidence,
            justification = EXCLUDED.justification,
            requires_review = EXCLUDED.requires_review,
            resolution = NULL,
            updated_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(version_id)
    .bind(entity.id)
    .bind(diff.matched_entity_type.as_deref())
    .bind(diff.matched_entity_id.as_deref())
    .bind(diff.comparison.diff_type.as_str())
    .bind(diff.comparison.similarity)
    // Diff confidence is the entity's extraction confidence, carried through.
    .bind(entity.confidence)
    .bind(&diff.comparison.justification)
    .bind(diff.comparison.requires_review)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_diffs(
    pool: &PgPool,
    version_id: Uuid,
    pending_only: bool,
) -> Result<Vec<DiffRow>, AppError> {
    let rows: Vec<DiffRow> = if pending_only {
        sqlx::query_as(
            "SELECT * FROM diffs WHERE version_id = $1 AND requires_review ORDER BY created_at ASC",
        )
        .bind(version_id)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as("SELECT * FROM diffs WHERE version_id = $1 ORDER BY created_at ASC")
            .bind(version_id)
            .fetch_all(pool)
            .await?
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_profile_entry(entity_type: &str, entity_id: &str, field_name: &str) -> ProfileEntryRow {
        ProfileEntryRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            field_name: field_name.to_string(),
            confirmed_value: json!({"kind": "text", "value": "Senior Engineer"}),
            confidence: 1.0,
            source: "manual".to_string(),
            confirmed_at: Utc::now(),
        }
    }

    fn make_entity(field_name: &str, value: &str, confidence: f64) -> EntityRow {
        EntityRow {
            id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
            field_name: field_name.to_string(),
            value: FieldValue::Text(value.to_string()).to_stored(),
            confidence,
            extractor_model: "test-model".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Comparator stub that always fails, forcing the fallback path, and
    /// counts how often it was invoked.
    struct DownComparator(AtomicUsize);

    #[async_trait]
    impl ComparisonService for DownComparator {
        async fn compare(&self, _: &str, _: &str) -> Result<Comparison, AppError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Llm("comparator down".to_string()))
        }
    }

    #[test]
    fn test_entity_type_prefix() {
        assert_eq!(entity_type_prefix("work_experience.0.title"), "work_experience");
        assert_eq!(entity_type_prefix("skills"), "skills");
    }

    #[test]
    fn test_find_candidates_by_type_prefix() {
        let entries = vec![
            make_profile_entry("work_experience", "work_experience.0", "work_experience.0.title"),
            make_profile_entry("education", "education.0", "education.0.degree"),
        ];
        let candidates = find_candidates(&entries, "work_experience.1.title");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].entity_type, "work_experience");
    }

    #[test]
    fn test_find_candidates_by_substring_either_direction() {
        let entries = vec![make_profile_entry("profile", "profile.0", "Work_Experience.0.Title")];
        // Case-insensitive: the stored field name matches the query exactly
        // apart from case.
        let candidates = find_candidates(&entries, "work_experience.0.title");
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_find_candidates_none() {
        let entries = vec![make_profile_entry("education", "education.0", "education.0.degree")];
        assert!(find_candidates(&entries, "work_experience.0.title").is_empty());
    }

    #[tokio::test]
    async fn test_no_candidates_classifies_new_without_comparator_call() {
        let comparator = DownComparator(AtomicUsize::new(0));
        let entity = make_entity("work_experience.0.title", "Senior Engineer", 0.9);

        let diff = classify_entity(&comparator, &entity, &[]).await;
        assert_eq!(diff.comparison.diff_type, DiffType::New);
        assert_eq!(diff.comparison.similarity, 0.0);
        assert!(!diff.comparison.requires_review);
        assert!(diff.matched_entity_id.is_none());
        assert_eq!(comparator.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_comparator_failure_degrades_to_fallback() {
        let comparator = DownComparator(AtomicUsize::new(0));
        let entity = make_entity("work_experience.0.title", "senior engineer", 0.9);
        let target =
            make_profile_entry("work_experience", "work_experience.0", "work_experience.0.title");

        let diff = classify_entity(&comparator, &entity, &[&target]).await;
        assert_eq!(comparator.0.load(Ordering::SeqCst), 1);
        // Fallback sees "senior engineer" vs "Senior Engineer".
        assert_eq!(diff.comparison.diff_type, DiffType::Identical);
        assert_eq!(diff.matched_entity_id.as_deref(), Some("work_experience.0"));
    }

    #[tokio::test]
    async fn test_multiple_candidates_force_review() {
        let comparator = DownComparator(AtomicUsize::new(0));
        let entity = make_entity("work_experience.0.title", "Senior Engineer", 0.9);
        let a = make_profile_entry("work_experience", "work_experience.0", "work_experience.0.title");
        let b = make_profile_entry("work_experience", "work_experience.1", "work_experience.1.title");

        let diff = classify_entity(&comparator, &entity, &[&a, &b]).await;
        // Identical by fallback, but the ambiguous match still needs a look.
        assert_eq!(diff.comparison.diff_type, DiffType::Identical);
        assert!(diff.comparison.requires_review);
        // First candidate keeps precedence.
        assert_eq!(diff.matched_entity_id.as_deref(), Some("work_experience.0"));
    }
}
