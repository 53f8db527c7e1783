pub mod handlers;
pub mod resolver;

pub use resolver::{apply_decisions, record_decision, ApplySummary, RecordDecisionParams};
