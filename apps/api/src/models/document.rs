use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A named, owner-scoped grouping of document versions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StreamRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub auto_tagged: bool,
    pub created_at: DateTime<Utc>,
}

/// One immutable uploaded document snapshot.
///
/// `processing_status` is the explicitly written lifecycle value; the reported
/// stage is always re-derived from it plus the live entity/enrichment flags
/// (see `processing::derive_stage`), never read back from storage.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VersionRow {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub owner_id: Uuid,
    pub version_number: i32,
    pub content_hash: String,
    pub byte_size: i64,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub processing_status: String,
    pub processing_progress: i32,
    pub created_at: DateTime<Utc>,
}

/// Explicit processing lifecycle value stored on a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Complete => "complete",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Unknown stored values degrade to `Pending` rather than erroring: the
    /// derivation rule treats anything that is not an explicit failure as
    /// flag-driven.
    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => ProcessingStatus::Processing,
            "complete" => ProcessingStatus::Complete,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Complete,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(ProcessingStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_degrades_to_pending() {
        assert_eq!(ProcessingStatus::parse("weird"), ProcessingStatus::Pending);
    }
}
