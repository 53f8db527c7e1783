pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod service;

pub use service::{ExtractedField, ExtractionService, LlmExtractor};
