use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One extracted field from a version. Dotted field names address positions
/// inside the document structure, e.g. `work_experience.0.title`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityRow {
    pub id: Uuid,
    pub version_id: Uuid,
    pub field_name: String,
    pub value: Value,
    pub confidence: f64,
    pub extractor_model: String,
    pub created_at: DateTime<Utc>,
}

impl EntityRow {
    pub fn field_value(&self) -> FieldValue {
        FieldValue::from_stored(&self.value)
    }
}

/// AI-derived analysis attached 1:1 to an entity. A forced refresh replaces
/// the content in place under the same row identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EnrichmentRow {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub version_id: Uuid,
    pub insights: Vec<String>,
    pub skills: Vec<String>,
    pub experience_level: Option<String>,
    pub career_progression: Option<String>,
    pub market_relevance: Option<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub model: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Extracted values are free text or embedded structured data of varying
/// shape. Modeled as a tagged union rather than an untyped blob; diffing and
/// enrichment operate only on the text projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Structured(Value),
}

impl FieldValue {
    /// Classifies a raw extractor value: JSON strings are text, everything
    /// else (objects, arrays, numbers) is structured.
    pub fn from_raw(value: Value) -> Self {
        match value {
            Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Structured(other),
        }
    }

    /// Reads back a stored tagged value. Rows written before the tagged
    /// encoding existed fall back to raw classification.
    pub fn from_stored(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| Self::from_raw(value.clone()))
    }

    pub fn to_stored(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The text projection used for comparison and enrichment prompts.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s),
            FieldValue::Structured(v) => Cow::Owned(v.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw_string_is_text() {
        let v = FieldValue::from_raw(json!("Senior Engineer"));
        assert_eq!(v, FieldValue::Text("Senior Engineer".to_string()));
        assert_eq!(v.as_text(), "Senior Engineer");
    }

    #[test]
    fn test_from_raw_object_is_structured() {
        let v = FieldValue::from_raw(json!({"title": "Senior Engineer"}));
        assert!(matches!(v, FieldValue::Structured(_)));
        assert_eq!(v.as_text(), r#"{"title":"Senior Engineer"}"#);
    }

    #[test]
    fn test_stored_round_trip() {
        let v = FieldValue::Text("hello".to_string());
        assert_eq!(FieldValue::from_stored(&v.to_stored()), v);

        let v = FieldValue::Structured(json!([1, 2, 3]));
        assert_eq!(FieldValue::from_stored(&v.to_stored()), v);
    }

    #[test]
    fn test_untagged_stored_value_falls_back_to_raw() {
        // A bare string that never went through to_stored.
        let v = FieldValue::from_stored(&json!("plain"));
        assert_eq!(v, FieldValue::Text("plain".to_string()));
    }
}
