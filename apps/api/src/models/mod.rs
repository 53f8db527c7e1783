pub mod diff;
pub mod document;
pub mod entity;
pub mod profile;

pub use entity::FieldValue;
