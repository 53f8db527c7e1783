pub mod comparator;
pub mod engine;
pub mod handlers;
pub mod prompts;

pub use comparator::{fallback_compare, Comparison, ComparisonService, LlmComparator};
pub use engine::{analyze_version, list_diffs, DiffSummary};
