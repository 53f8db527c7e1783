use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::diffing::prompts::{COMPARE_PROMPT, COMPARE_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::models::diff::DiffType;

/// Result of comparing one extracted value against one confirmed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub diff_type: DiffType,
    pub similarity: f64,
    pub justification: String,
    pub requires_review: bool,
}

/// External semantic-comparison collaborator. When a call fails the engine
/// degrades to `fallback_compare` — the pipeline never stalls solely because
/// the comparator is down.
#[async_trait]
pub trait ComparisonService: Send + Sync {
    async fn compare(&self, extracted: &str, confirmed: &str) -> Result<Comparison, AppError>;
}

/// Default comparator: one structured-output LLM call per pair.
pub struct LlmComparator {
    llm: LlmClient,
}

impl LlmComparator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ComparisonService for LlmComparator {
    async fn compare(&self, extracted: &str, confirmed: &str) -> Result<Comparison, AppError> {
        let prompt = COMPARE_PROMPT
            .replace("{extracted}", extracted)
            .replace("{confirmed}", confirmed);

        let mut comparison: Comparison = self
            .llm
            .call_json(&prompt, COMPARE_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Comparison failed: {e}")))?;

        comparison.similarity = comparison.similarity.clamp(0.0, 1.0);
        Ok(comparison)
    }
}

/// Deterministic string comparison used when the collaborator is unavailable
/// or errors. Case-insensitive equality is identical; containment either way
/// is equivalent; anything else conflicts and needs a human look.
pub fn fallback_compare(extracted: &str, confirmed: &str) -> Comparison {
    let a = extracted.trim().to_lowercase();
    let b = confirmed.trim().to_lowercase();

    if a == b {
        return Comparison {
            diff_type: DiffType::Identical,
            similarity: 1.0,
            justification: "Values match exactly (case-insensitive); comparator unavailable"
                .to_string(),
            requires_review: false,
        };
    }

    if !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a)) {
        return Comparison {
            diff_type: DiffType::Equivalent,
            similarity: 0.8,
            justification: "One value contains the other; comparator unavailable".to_string(),
            requires_review: false,
        };
    }

    Comparison {
        diff_type: DiffType::Conflicting,
        similarity: 0.3,
        justification: "Values differ and comparator unavailable; flagged for review".to_string(),
        requires_review: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_case_insensitive_match_is_identical() {
        let c = fallback_compare("Senior Engineer", "senior engineer");
        assert_eq!(c.diff_type, DiffType::Identical);
        assert_eq!(c.similarity, 1.0);
        assert!(!c.requires_review);
    }

    #[test]
    fn test_fallback_containment_is_equivalent() {
        let c = fallback_compare("Engineer", "Senior Engineer");
        assert_eq!(c.diff_type, DiffType::Equivalent);
        assert_eq!(c.similarity, 0.8);
        assert!(!c.requires_review);

        // Containment in the other direction classifies the same way.
        let c = fallback_compare("Senior Engineer", "Engineer");
        assert_eq!(c.diff_type, DiffType::Equivalent);
    }

    #[test]
    fn test_fallback_unrelated_values_conflict() {
        let c = fallback_compare("Engineer", "Product Manager");
        assert_eq!(c.diff_type, DiffType::Conflicting);
        assert_eq!(c.similarity, 0.3);
        assert!(c.requires_review);
    }

    #[test]
    fn test_fallback_ignores_surrounding_whitespace() {
        let c = fallback_compare("  Acme Corp ", "acme corp");
        assert_eq!(c.diff_type, DiffType::Identical);
    }

    #[test]
    fn test_fallback_empty_extracted_does_not_contain_match() {
        // An empty string is a substring of everything; it must not be
        // classified equivalent to a real value.
        let c = fallback_compare("", "Senior Engineer");
        assert_eq!(c.diff_type, DiffType::Conflicting);
    }
}
