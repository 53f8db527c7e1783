use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One fact the owner has accepted as authoritative about themselves.
/// At most one live row per (owner, entity_type, entity_id, field_name);
/// later writes upsert by that composite key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileEntryRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub entity_type: String,
    /// Logical entity id, e.g. `work_experience.0`. Shared across the fields
    /// of one logical entity; not a row key.
    pub entity_id: String,
    pub field_name: String,
    pub confirmed_value: Value,
    pub confidence: f64,
    pub source: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Every entity type the confirmed profile accepts. Writes keyed by
/// anything else are refused; the column is free TEXT, so this list is the
/// only guard against a typo fragmenting the profile.
pub const PROFILE_ENTITY_TYPES: &[&str] = &[
    "contact",
    "summary",
    "work_experience",
    "education",
    "skills",
    "projects",
    "certifications",
    "publications",
    "awards",
    "languages",
    "volunteer",
    "open_source",
];

pub fn is_known_entity_type(entity_type: &str) -> bool {
    PROFILE_ENTITY_TYPES.contains(&entity_type)
}

/// Provenance of a confirmed profile entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    Manual,
    MergeAccepted,
    MergeOverridden,
}

impl ProvenanceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvenanceSource::Manual => "manual",
            ProvenanceSource::MergeAccepted => "merge_accepted",
            ProvenanceSource::MergeOverridden => "merge_overridden",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_entity_types() {
        assert!(is_known_entity_type("work_experience"));
        assert!(is_known_entity_type("skills"));
        assert!(!is_known_entity_type("work experience"));
        assert!(!is_known_entity_type("garbage"));
        assert!(!is_known_entity_type(""));
    }
}
