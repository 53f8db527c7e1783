use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::diffing::comparator::ComparisonService;
use crate::enrichment::service::EnrichmentService;
use crate::extraction::service::ExtractionService;

/// Shared application state injected into all route handlers via Axum
/// extractors. The three external collaborators are trait objects so tests
/// (and future backends) can substitute implementations without touching
/// handler code.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub config: Config,
    pub extractor: Arc<dyn ExtractionService>,
    pub enricher: Arc<dyn EnrichmentService>,
    pub comparator: Arc<dyn ComparisonService>,
}
