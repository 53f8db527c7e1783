//! Extraction orchestration: fetch the stored bytes, invoke the collaborator
//! once, and swap in the full replacement entity set transactionally.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::documents::store::get_version;
use crate::errors::AppError;
use crate::extraction::service::{ExtractedField, ExtractionService};
use crate::models::document::ProcessingStatus;
use crate::models::entity::EntityRow;
use crate::processing::{mark_failed, set_status};

#[derive(Debug, serde::Serialize)]
pub struct ExtractionOutcome {
    pub version_id: Uuid,
    pub entity_count: usize,
}

/// Runs extraction for one version. A collaborator failure marks the version
/// `failed` and commits no partial entity set; a stored set from an earlier
/// run stays intact in that case.
pub async fn run_extraction(
    pool: &PgPool,
    s3: &aws_sdk_s3::Client,
    s3_bucket: &str,
    extractor: &dyn ExtractionService,
    version_id: Uuid,
) -> Result<ExtractionOutcome, AppError> {
    let version = get_version(pool, version_id).await?;

    set_status(pool, version_id, ProcessingStatus::Processing, Some(10)).await?;

    let bytes = fetch_document(s3, s3_bucket, &version.owner_id, &version.content_hash).await?;

    let fields = match extractor.extract(&bytes, &version.mime_type).await {
        Ok(fields) => fields,
        Err(e) => {
            mark_failed(pool, version_id).await?;
            return Err(AppError::Processing(format!(
                "Extraction failed for version {version_id}: {e}"
            )));
        }
    };

    let entity_count = fields.len();
    replace_entities(pool, version_id, &fields, extractor.model_id()).await?;
    set_status(pool, version_id, ProcessingStatus::Processing, Some(35)).await?;

    info!("Extracted {entity_count} entities for version {version_id}");
    Ok(ExtractionOutcome {
        version_id,
        entity_count,
    })
}

/// Replaces the version's entity set in one transaction — delete then
/// insert, never an incremental patch, so concurrent readers see either the
/// old set or the new one. Stale enrichments and diffs for the version go
/// with the old set; they referred to entities that no longer exist.
pub async fn replace_entities(
    pool: &PgPool,
    version_id: Uuid,
    fields: &[ExtractedField],
    model_id: &str,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM enrichments WHERE version_id = $1")
        .bind(version_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM diffs WHERE version_id = $1")
        .bind(version_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM entities WHERE version_id = $1")
        .bind(version_id)
        .execute(&mut *tx)
        .await?;

    for field in fields {
        sqlx::query(
            r#"
            INSERT INTO entities (id, version_id, field_name, value, confidence, extractor_model)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(version_id)
        .bind(&field.field_name)
        .bind(field.value.to_stored())
        .bind(field.confidence)
        .bind(model_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn list_entities(pool: &PgPool, version_id: Uuid) -> Result<Vec<EntityRow>, AppError> {
    Ok(
        sqlx::query_as("SELECT * FROM entities WHERE version_id = $1 ORDER BY field_name ASC")
            .bind(version_id)
            .fetch_all(pool)
            .await?,
    )
}

async fn fetch_document(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    owner_id: &Uuid,
    content_hash: &str,
) -> Result<Vec<u8>, AppError> {
    let key = format!("documents/{owner_id}/{content_hash}");
    let object = s3
        .get_object()
        .bucket(bucket)
        .key(&key)
        .send()
        .await
        .map_err(|e| AppError::Storage(format!("S3 download failed for {key}: {e}")))?;

    let bytes = object
        .body
        .collect()
        .await
        .map_err(|e| AppError::Storage(format!("S3 body read failed for {key}: {e}")))?;

    Ok(bytes.into_bytes().to_vec())
}
