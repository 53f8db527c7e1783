use axum::extract::{Multipart, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::documents::store::{
    create_stream, delete_all_for_owner, list_streams, list_versions, upload_version,
    PurgeSummary, UploadMetadata, UploadOutcome,
};
use crate::errors::AppError;
use crate::extractors::{Json, Path, Query};
use crate::models::document::{StreamRow, VersionRow};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OwnerIdQuery {
    pub owner_id: Uuid,
}

#[derive(Deserialize)]
pub struct CreateStreamRequest {
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// POST /api/v1/streams
pub async fn handle_create_stream(
    State(state): State<AppState>,
    Json(req): Json<CreateStreamRequest>,
) -> Result<Json<StreamRow>, AppError> {
    let stream = create_stream(
        &state.db,
        req.owner_id,
        &req.name,
        req.description.as_deref(),
        req.tags,
    )
    .await?;
    Ok(Json(stream))
}

/// GET /api/v1/streams
pub async fn handle_list_streams(
    State(state): State<AppState>,
    Query(params): Query<OwnerIdQuery>,
) -> Result<Json<Vec<StreamRow>>, AppError> {
    Ok(Json(list_streams(&state.db, params.owner_id).await?))
}

/// GET /api/v1/streams/:id/versions
pub async fn handle_list_versions(
    State(state): State<AppState>,
    Path(stream_id): Path<Uuid>,
) -> Result<Json<Vec<VersionRow>>, AppError> {
    Ok(Json(list_versions(&state.db, stream_id).await?))
}

/// POST /api/v1/streams/:id/versions
/// Accepts the document as a multipart `file` part.
pub async fn handle_upload_version(
    State(state): State<AppState>,
    Path(stream_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let metadata = UploadMetadata {
            mime_type: field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            file_name: field.file_name().map(String::from),
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;

        let outcome = upload_version(
            &state.db,
            &state.s3,
            &state.config.s3_bucket,
            stream_id,
            &bytes,
            metadata,
        )
        .await?;
        return Ok(Json(outcome));
    }

    Err(AppError::Validation(
        "Multipart body must contain a 'file' part".into(),
    ))
}

/// DELETE /api/v1/owners/:id
pub async fn handle_purge_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<PurgeSummary>, AppError> {
    Ok(Json(delete_all_for_owner(&state.db, owner_id).await?))
}
