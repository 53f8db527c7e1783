use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Classified comparison between one entity and at most one confirmed
/// profile entry. Exactly one live row per (version, entity); re-analysis
/// upserts rather than appends.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiffRow {
    pub id: Uuid,
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub matched_entity_type: Option<String>,
    pub matched_entity_id: Option<String>,
    pub diff_type: String,
    pub similarity: f64,
    pub confidence: f64,
    pub justification: String,
    pub requires_review: bool,
    /// Null until a decision resolves this diff.
    pub resolution: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Identical,
    Equivalent,
    Conflicting,
    New,
}

impl DiffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffType::Identical => "identical",
            DiffType::Equivalent => "equivalent",
            DiffType::Conflicting => "conflicting",
            DiffType::New => "new",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "identical" => Some(DiffType::Identical),
            "equivalent" => Some(DiffType::Equivalent),
            "conflicting" => Some(DiffType::Conflicting),
            "new" => Some(DiffType::New),
            _ => None,
        }
    }
}

/// One recorded ruling on a diff. Append-only; applying decisions is a
/// separate idempotent step (`merge::apply_decisions`). The entity's value
/// and confidence are snapshotted at recording time for audit, so a later
/// re-extraction cannot change what a decision meant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DecisionRow {
    pub id: Uuid,
    pub version_id: Uuid,
    pub entity_id: Uuid,
    pub owner_id: Uuid,
    pub decision_type: String,
    pub override_value: Option<Value>,
    pub snapshot_value: Value,
    pub snapshot_confidence: f64,
    pub profile_entity_type: String,
    pub profile_entity_id: String,
    pub field_name: String,
    pub justification: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Accept,
    Reject,
    Override,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Accept => "accept",
            DecisionType::Reject => "reject",
            DecisionType::Override => "override",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accept" => Some(DecisionType::Accept),
            "reject" => Some(DecisionType::Reject),
            "override" => Some(DecisionType::Override),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_type_round_trip() {
        for t in [
            DiffType::Identical,
            DiffType::Equivalent,
            DiffType::Conflicting,
            DiffType::New,
        ] {
            assert_eq!(DiffType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DiffType::parse("unknown"), None);
    }

    #[test]
    fn test_decision_type_round_trip() {
        for t in [
            DecisionType::Accept,
            DecisionType::Reject,
            DecisionType::Override,
        ] {
            assert_eq!(DecisionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DecisionType::parse("maybe"), None);
    }
}
