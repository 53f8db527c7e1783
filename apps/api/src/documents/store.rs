//! Document Store — streams, versioned uploads with content-hash dedup, and
//! the owner-wide cascade purge.

use aws_sdk_s3::primitives::ByteStream;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::{StreamRow, VersionRow};

/// Caller-supplied metadata for one upload.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub mime_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub version: VersionRow,
    /// True when identical bytes were already on file for this owner. The
    /// returned version is the original; no write happened.
    pub is_duplicate: bool,
}

/// Row counts removed by an owner purge, reported child-first.
#[derive(Debug, Serialize)]
pub struct PurgeSummary {
    pub decisions: u64,
    pub diffs: u64,
    pub enrichments: u64,
    pub entities: u64,
    pub versions: u64,
    pub streams: u64,
}

/// Lowercase hex SHA-256 of the raw bytes. Dedup scope is the owner.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Which uniqueness guarantee a concurrent insert tripped over.
#[derive(Debug, PartialEq, Eq)]
pub enum UploadConflict {
    /// Another request stored the same bytes for this owner first.
    DuplicateContent,
    /// Another request claimed this version number in the stream first.
    VersionNumber,
    Other,
}

/// Maps a unique-violation constraint name to the upload it lost against.
pub fn classify_upload_conflict(constraint: Option<&str>) -> UploadConflict {
    match constraint {
        Some("versions_owner_content_hash_key") => UploadConflict::DuplicateContent,
        Some("versions_stream_version_key") => UploadConflict::VersionNumber,
        _ => UploadConflict::Other,
    }
}

/// Machine-derived tags for a stream whose creator supplied none: the
/// distinct lowercase words of the display name.
pub fn derive_tags(name: &str) -> Vec<String> {
    let mut tags: Vec<String> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

pub async fn create_stream(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
    description: Option<&str>,
    tags: Option<Vec<String>>,
) -> Result<StreamRow, AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Stream name must not be empty".into()));
    }

    let auto_tagged = tags.is_none();
    let tags = tags.unwrap_or_else(|| derive_tags(name));

    let stream: StreamRow = sqlx::query_as(
        r#"
        INSERT INTO streams (id, owner_id, name, description, tags, auto_tagged)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind(name)
    .bind(description)
    .bind(&tags)
    .bind(auto_tagged)
    .fetch_one(pool)
    .await?;

    info!("Created stream {} for owner {owner_id}", stream.id);
    Ok(stream)
}

/// Stores one uploaded snapshot. Identical bytes already on file for the
/// owner short-circuit to the existing version — across all of the owner's
/// streams, not just the target one.
pub async fn upload_version(
    pool: &PgPool,
    s3: &aws_sdk_s3::Client,
    s3_bucket: &str,
    stream_id: Uuid,
    bytes: &[u8],
    metadata: UploadMetadata,
) -> Result<UploadOutcome, AppError> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded document is empty".into()));
    }

    let stream: Option<StreamRow> = sqlx::query_as("SELECT * FROM streams WHERE id = $1")
        .bind(stream_id)
        .fetch_optional(pool)
        .await?;
    let stream =
        stream.ok_or_else(|| AppError::NotFound(format!("Stream {stream_id} not found")))?;

    let hash = content_hash(bytes);

    let existing: Option<VersionRow> =
        sqlx::query_as("SELECT * FROM versions WHERE owner_id = $1 AND content_hash = $2")
            .bind(stream.owner_id)
            .bind(&hash)
            .fetch_optional(pool)
            .await?;

    if let Some(version) = existing {
        info!(
            "Duplicate upload for owner {} (hash {hash}), returning version {}",
            stream.owner_id, version.id
        );
        return Ok(UploadOutcome {
            version,
            is_duplicate: true,
        });
    }

    // Raw bytes go to object storage keyed by hash; the row holds metadata only.
    let s3_key = format!("documents/{}/{hash}", stream.owner_id);
    s3.put_object()
        .bucket(s3_bucket)
        .key(&s3_key)
        .body(ByteStream::from(bytes.to_vec()))
        .content_type(&metadata.mime_type)
        .send()
        .await
        .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

    // The SELECT above is only a fast path; concurrent uploads can still
    // collide on either unique constraint. Classify the violation instead of
    // surfacing a 500: a content-hash loser re-reads the winner's row, a
    // version-number loser recomputes MAX+1 and retries.
    for _ in 0..3 {
        let current_max: Option<i32> =
            sqlx::query_scalar("SELECT MAX(version_number) FROM versions WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_one(pool)
                .await?;
        let version_number = current_max.unwrap_or(0) + 1;

        match insert_version(pool, stream_id, stream.owner_id, version_number, &hash, bytes, &metadata).await
        {
            Ok(version) => {
                info!(
                    "Stored version {} (v{version_number}) in stream {stream_id}",
                    version.id
                );
                return Ok(UploadOutcome {
                    version,
                    is_duplicate: false,
                });
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                match classify_upload_conflict(db.constraint()) {
                    UploadConflict::DuplicateContent => {
                        let version: VersionRow = sqlx::query_as(
                            "SELECT * FROM versions WHERE owner_id = $1 AND content_hash = $2",
                        )
                        .bind(stream.owner_id)
                        .bind(&hash)
                        .fetch_one(pool)
                        .await?;
                        info!(
                            "Concurrent duplicate upload for owner {} (hash {hash}), returning version {}",
                            stream.owner_id, version.id
                        );
                        return Ok(UploadOutcome {
                            version,
                            is_duplicate: true,
                        });
                    }
                    UploadConflict::VersionNumber => continue,
                    UploadConflict::Other => return Err(sqlx::Error::Database(db).into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Processing(format!(
        "Could not claim a version number in stream {stream_id} after repeated conflicts"
    )))
}

async fn insert_version(
    pool: &PgPool,
    stream_id: Uuid,
    owner_id: Uuid,
    version_number: i32,
    hash: &str,
    bytes: &[u8],
    metadata: &UploadMetadata,
) -> Result<VersionRow, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO versions
            (id, stream_id, owner_id, version_number, content_hash,
             byte_size, mime_type, file_name, processing_status, processing_progress)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 0)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(stream_id)
    .bind(owner_id)
    .bind(version_number)
    .bind(hash)
    .bind(bytes.len() as i64)
    .bind(&metadata.mime_type)
    .bind(metadata.file_name.as_deref())
    .fetch_one(pool)
    .await
}

pub async fn get_version(pool: &PgPool, version_id: Uuid) -> Result<VersionRow, AppError> {
    let version: Option<VersionRow> = sqlx::query_as("SELECT * FROM versions WHERE id = $1")
        .bind(version_id)
        .fetch_optional(pool)
        .await?;
    version.ok_or_else(|| AppError::NotFound(format!("Version {version_id} not found")))
}

pub async fn list_streams(pool: &PgPool, owner_id: Uuid) -> Result<Vec<StreamRow>, AppError> {
    Ok(
        sqlx::query_as("SELECT * FROM streams WHERE owner_id = $1 ORDER BY created_at ASC")
            .bind(owner_id)
            .fetch_all(pool)
            .await?,
    )
}

pub async fn list_versions(pool: &PgPool, stream_id: Uuid) -> Result<Vec<VersionRow>, AppError> {
    Ok(
        sqlx::query_as("SELECT * FROM versions WHERE stream_id = $1 ORDER BY version_number ASC")
            .bind(stream_id)
            .fetch_all(pool)
            .await?,
    )
}

/// Removes everything the owner has, in strict dependency order inside one
/// transaction: decisions/diffs/enrichments, then entities, then versions,
/// then streams. Any failure rolls the whole purge back — a partially
/// deleted owner is worse than a failed request.
pub async fn delete_all_for_owner(pool: &PgPool, owner_id: Uuid) -> Result<PurgeSummary, AppError> {
    let mut tx = pool.begin().await?;

    let decisions = sqlx::query("DELETE FROM decisions WHERE owner_id = $1")
        .bind(owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let diffs = sqlx::query(
        "DELETE FROM diffs WHERE version_id IN (SELECT id FROM versions WHERE owner_id = $1)",
    )
    .bind(owner_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let enrichments = sqlx::query(
        "DELETE FROM enrichments WHERE version_id IN (SELECT id FROM versions WHERE owner_id = $1)",
    )
    .bind(owner_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let entities = sqlx::query(
        "DELETE FROM entities WHERE version_id IN (SELECT id FROM versions WHERE owner_id = $1)",
    )
    .bind(owner_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let versions = sqlx::query("DELETE FROM versions WHERE owner_id = $1")
        .bind(owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let streams = sqlx::query("DELETE FROM streams WHERE owner_id = $1")
        .bind(owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    info!("Purged owner {owner_id}: {streams} streams, {versions} versions, {entities} entities");

    Ok(PurgeSummary {
        decisions,
        diffs,
        enrichments,
        entities,
        versions,
        streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex_sha256() {
        let h = content_hash(b"hello");
        assert_eq!(
            h,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(h, content_hash(b"hello"));
    }

    #[test]
    fn test_content_hash_differs_on_different_bytes() {
        assert_ne!(content_hash(b"resume v1"), content_hash(b"resume v2"));
    }

    #[test]
    fn test_derive_tags_lowercases_and_dedups() {
        let tags = derive_tags("Backend Resume — Backend 2025");
        assert_eq!(tags, vec!["2025", "backend", "resume"]);
    }

    #[test]
    fn test_derive_tags_drops_short_words() {
        let tags = derive_tags("CV of me");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_classify_conflict_content_hash() {
        assert_eq!(
            classify_upload_conflict(Some("versions_owner_content_hash_key")),
            UploadConflict::DuplicateContent
        );
    }

    #[test]
    fn test_classify_conflict_version_number() {
        assert_eq!(
            classify_upload_conflict(Some("versions_stream_version_key")),
            UploadConflict::VersionNumber
        );
    }

    #[test]
    fn test_classify_conflict_unknown_constraint() {
        assert_eq!(
            classify_upload_conflict(Some("streams_pkey")),
            UploadConflict::Other
        );
        assert_eq!(classify_upload_conflict(None), UploadConflict::Other);
    }
}
