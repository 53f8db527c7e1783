pub mod cache;
pub mod handlers;
pub mod prompts;
pub mod service;

pub use cache::{enrich_all_for_version, enrich_entity, EnrichmentBatchSummary};
pub use service::{EnrichmentPayload, EnrichmentService, LlmEnricher};
