pub mod status;
pub mod tracker;

pub use status::{derive_stage, ProcessingStage, StageFlags};
pub use tracker::{get_processing_status, mark_failed, set_status, StatusReport};
