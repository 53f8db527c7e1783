use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::extraction::prompts::{EXTRACTION_PROMPT, EXTRACTION_SYSTEM};
use crate::llm_client::{LlmClient, MODEL};
use crate::models::FieldValue;

/// One extracted (field, value, confidence) triple, as reported by the
/// collaborator. Confidence is carried through unchanged; the pipeline never
/// recomputes it.
#[derive(Debug, Clone)]
pub struct ExtractedField {
    pub field_name: String,
    pub value: FieldValue,
    pub confidence: f64,
}

/// External extraction collaborator. Held in `AppState` as an
/// `Arc<dyn ExtractionService>` so tests can substitute a stub.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<ExtractedField>, AppError>;

    /// Identifier recorded on every entity this collaborator produced.
    fn model_id(&self) -> &str;
}

/// Default extractor: a single structured-output LLM call per version.
pub struct LlmExtractor {
    llm: LlmClient,
}

impl LlmExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[derive(Debug, Deserialize)]
struct RawField {
    field_name: String,
    value: Value,
    confidence: f64,
}

#[async_trait]
impl ExtractionService for LlmExtractor {
    async fn extract(
        &self,
        bytes: &[u8],
        _mime_type: &str,
    ) -> Result<Vec<ExtractedField>, AppError> {
        let text = String::from_utf8_lossy(bytes);
        let prompt = EXTRACTION_PROMPT.replace("{document_text}", &text);

        let raw: Vec<RawField> = self
            .llm
            .call_json(&prompt, EXTRACTION_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Extraction failed: {e}")))?;

        Ok(raw
            .into_iter()
            .map(|f| ExtractedField {
                field_name: f.field_name,
                value: FieldValue::from_raw(f.value),
                confidence: f.confidence.clamp(0.0, 1.0),
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        MODEL
    }
}
