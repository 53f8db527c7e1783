pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::diffing::handlers as diffing;
use crate::documents::handlers as documents;
use crate::enrichment::handlers as enrichment;
use crate::extraction::handlers as extraction;
use crate::merge::handlers as merge;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Document store
        .route("/api/v1/streams", post(documents::handle_create_stream))
        .route("/api/v1/streams", get(documents::handle_list_streams))
        .route(
            "/api/v1/streams/:id/versions",
            post(documents::handle_upload_version),
        )
        .route(
            "/api/v1/streams/:id/versions",
            get(documents::handle_list_versions),
        )
        .route("/api/v1/owners/:id", delete(documents::handle_purge_owner))
        // Processing pipeline
        .route(
            "/api/v1/versions/:id/extract",
            post(extraction::handle_extract),
        )
        .route(
            "/api/v1/versions/:id/entities",
            get(extraction::handle_list_entities),
        )
        .route("/api/v1/versions/:id/status", get(extraction::handle_status))
        .route(
            "/api/v1/versions/:id/enrich",
            post(enrichment::handle_enrich_version),
        )
        .route(
            "/api/v1/entities/:id/enrich",
            post(enrichment::handle_enrich_entity),
        )
        // Reconciliation
        .route("/api/v1/versions/:id/analyze", post(diffing::handle_analyze))
        .route("/api/v1/versions/:id/diffs", get(diffing::handle_list_diffs))
        .route(
            "/api/v1/versions/:id/decisions",
            post(merge::handle_record_decision),
        )
        .route(
            "/api/v1/versions/:id/decisions/apply",
            post(merge::handle_apply_decisions),
        )
        .with_state(state)
}
