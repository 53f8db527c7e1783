use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::{ProcessingStatus, VersionRow};
use crate::processing::status::{derive_stage, ProcessingStage, StageFlags};

/// The polling read model for one version. Assembled fresh on every read;
/// nothing here is cached.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version_id: Uuid,
    pub stage: ProcessingStage,
    pub progress: i32,
    /// True while callers should keep polling. An explicit failure stops
    /// polling immediately; retries belong to the extraction stage.
    pub in_flight: bool,
}

/// Recomputes the derived stage from the stored status plus live flags.
pub async fn get_processing_status(
    pool: &PgPool,
    version_id: Uuid,
) -> Result<StatusReport, AppError> {
    let version: Option<VersionRow> = sqlx::query_as("SELECT * FROM versions WHERE id = $1")
        .bind(version_id)
        .fetch_optional(pool)
        .await?;
    let version =
        version.ok_or_else(|| AppError::NotFound(format!("Version {version_id} not found")))?;

    let flags = query_flags(pool, version_id).await?;
    let status = ProcessingStatus::parse(&version.processing_status);
    let stage = derive_stage(status, flags);

    Ok(StatusReport {
        version_id,
        stage,
        progress: stage.progress().unwrap_or(version.processing_progress),
        in_flight: !stage.is_terminal(),
    })
}

async fn query_flags(pool: &PgPool, version_id: Uuid) -> Result<StageFlags, AppError> {
    let has_entities: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM entities WHERE version_id = $1)")
            .bind(version_id)
            .fetch_one(pool)
            .await?;

    let has_enrichment: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM enrichments WHERE version_id = $1)")
            .bind(version_id)
            .fetch_one(pool)
            .await?;

    let has_narratives: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM enrichments
         WHERE version_id = $1 AND COALESCE(career_progression, '') <> '')",
    )
    .bind(version_id)
    .fetch_one(pool)
    .await?;

    Ok(StageFlags {
        has_entities,
        has_enrichment,
        has_narratives,
    })
}

/// Writes the explicit status and, when given, the advisory progress value.
pub async fn set_status(
    pool: &PgPool,
    version_id: Uuid,
    status: ProcessingStatus,
    progress: Option<i32>,
) -> Result<(), AppError> {
    match progress {
        Some(p) => {
            sqlx::query(
                "UPDATE versions SET processing_status = $1, processing_progress = $2 WHERE id = $3",
            )
            .bind(status.as_str())
            .bind(p)
            .bind(version_id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query("UPDATE versions SET processing_status = $1 WHERE id = $2")
                .bind(status.as_str())
                .bind(version_id)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Marks a version failed, leaving the last persisted progress untouched.
/// Explicit failure always wins in the derivation rule, so this is enough to
/// stop pollers regardless of which flags were already set.
pub async fn mark_failed(pool: &PgPool, version_id: Uuid) -> Result<(), AppError> {
    warn!("Marking version {version_id} as failed");
    set_status(pool, version_id, ProcessingStatus::Failed, None).await
}
