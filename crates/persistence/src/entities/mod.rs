//! Document entity definitions.
//!
//! Entities are direct mappings to document field maps.

pub mod circle;

pub use circle::{CircleDocument, CIRCLES_COLLECTION, MEMBERS_FIELD};
