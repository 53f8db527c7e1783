use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::enrichment::prompts::{ENRICHMENT_PROMPT, ENRICHMENT_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::{LlmClient, MODEL};

/// Structured analysis of one entity, as returned by the collaborator.
/// Deserialization is the well-formedness check: output that does not fit
/// this shape fails the single entity, never the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentPayload {
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub experience_level: Option<String>,
    pub career_progression: Option<String>,
    pub market_relevance: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub confidence: f64,
}

/// External enrichment collaborator.
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn enrich(&self, field_name: &str, value: &str) -> Result<EnrichmentPayload, AppError>;

    fn model_id(&self) -> &str;
}

/// Default enricher: one structured-output LLM call per entity.
pub struct LlmEnricher {
    llm: LlmClient,
}

impl LlmEnricher {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl EnrichmentService for LlmEnricher {
    async fn enrich(&self, field_name: &str, value: &str) -> Result<EnrichmentPayload, AppError> {
        let prompt = ENRICHMENT_PROMPT
            .replace("{field_name}", field_name)
            .replace("{value}", value);

        let mut payload: EnrichmentPayload = self
            .llm
            .call_json(&prompt, ENRICHMENT_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Enrichment failed for '{field_name}': {e}")))?;

        payload.confidence = payload.confidence.clamp(0.0, 1.0);
        Ok(payload)
    }

    fn model_id(&self) -> &str {
        MODEL
    }
}
