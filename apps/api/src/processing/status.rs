//! Stage derivation — a pure function over the explicit status plus three
//! live flags. The reported stage is recomputed on every read rather than
//! trusted as stored state, so out-of-order flag writes (enrichment landing
//! before the status row updates) still yield a correct answer.

use serde::{Deserialize, Serialize};

use crate::models::document::ProcessingStatus;

/// Derived lifecycle position of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Pending,
    Parsing,
    Enriching,
    Complete,
    Failed,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Pending => "pending",
            ProcessingStage::Parsing => "parsing",
            ProcessingStage::Enriching => "enriching",
            ProcessingStage::Complete => "complete",
            ProcessingStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStage::Complete | ProcessingStage::Failed)
    }

    /// Advisory progress percentage for pollers. Failure reports no number
    /// of its own; callers keep whatever was last persisted.
    pub fn progress(&self) -> Option<i32> {
        match self {
            ProcessingStage::Pending => Some(0),
            ProcessingStage::Parsing => Some(35),
            ProcessingStage::Enriching => Some(70),
            ProcessingStage::Complete => Some(100),
            ProcessingStage::Failed => None,
        }
    }
}

/// Live flags queried from the entity/enrichment stores at read time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageFlags {
    pub has_entities: bool,
    pub has_enrichment: bool,
    pub has_narratives: bool,
}

/// Derivation rule, in precedence order:
/// 1. explicit `failed` status always wins
/// 2. narratives + enrichment + entities -> complete
/// 3. enrichment + entities -> enriching
/// 4. entities -> parsing
/// 5. otherwise -> pending
pub fn derive_stage(status: ProcessingStatus, flags: StageFlags) -> ProcessingStage {
    if status == ProcessingStatus::Failed {
        return ProcessingStage::Failed;
    }
    if flags.has_narratives && flags.has_enrichment && flags.has_entities {
        return ProcessingStage::Complete;
    }
    if flags.has_enrichment && flags.has_entities {
        return ProcessingStage::Enriching;
    }
    if flags.has_entities {
        return ProcessingStage::Parsing;
    }
    ProcessingStage::Pending
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [ProcessingStatus; 4] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Processing,
        ProcessingStatus::Complete,
        ProcessingStatus::Failed,
    ];

    fn flags(has_entities: bool, has_enrichment: bool, has_narratives: bool) -> StageFlags {
        StageFlags {
            has_entities,
            has_enrichment,
            has_narratives,
        }
    }

    #[test]
    fn test_failed_status_overrides_all_flags() {
        for e in [false, true] {
            for n in [false, true] {
                for m in [false, true] {
                    assert_eq!(
                        derive_stage(ProcessingStatus::Failed, flags(e, n, m)),
                        ProcessingStage::Failed
                    );
                }
            }
        }
    }

    #[test]
    fn test_all_flags_set_is_complete() {
        assert_eq!(
            derive_stage(ProcessingStatus::Processing, flags(true, true, true)),
            ProcessingStage::Complete
        );
    }

    #[test]
    fn test_enrichment_without_narratives_is_enriching() {
        assert_eq!(
            derive_stage(ProcessingStatus::Processing, flags(true, true, false)),
            ProcessingStage::Enriching
        );
    }

    #[test]
    fn test_entities_only_is_parsing() {
        assert_eq!(
            derive_stage(ProcessingStatus::Processing, flags(true, false, false)),
            ProcessingStage::Parsing
        );
    }

    #[test]
    fn test_no_flags_is_pending() {
        assert_eq!(
            derive_stage(ProcessingStatus::Pending, flags(false, false, false)),
            ProcessingStage::Pending
        );
    }

    #[test]
    fn test_out_of_order_flags_without_entities_stay_pending() {
        // Enrichment flag arriving before the entity flag must not report a
        // later stage than the evidence supports.
        assert_eq!(
            derive_stage(ProcessingStatus::Processing, flags(false, true, true)),
            ProcessingStage::Pending
        );
    }

    #[test]
    fn test_derivation_is_total() {
        // Every input combination yields exactly one of the five stages.
        for status in ALL_STATUSES {
            for e in [false, true] {
                for n in [false, true] {
                    for m in [false, true] {
                        let stage = derive_stage(status, flags(e, n, m));
                        assert!(matches!(
                            stage,
                            ProcessingStage::Pending
                                | ProcessingStage::Parsing
                                | ProcessingStage::Enriching
                                | ProcessingStage::Complete
                                | ProcessingStage::Failed
                        ));
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_stages() {
        assert!(ProcessingStage::Complete.is_terminal());
        assert!(ProcessingStage::Failed.is_terminal());
        assert!(!ProcessingStage::Enriching.is_terminal());
        assert!(!ProcessingStage::Pending.is_terminal());
    }

    #[test]
    fn test_progress_mapping() {
        assert_eq!(ProcessingStage::Pending.progress(), Some(0));
        assert_eq!(ProcessingStage::Parsing.progress(), Some(35));
        assert_eq!(ProcessingStage::Enriching.progress(), Some(70));
        assert_eq!(ProcessingStage::Complete.progress(), Some(100));
        assert_eq!(ProcessingStage::Failed.progress(), None);
    }
}
