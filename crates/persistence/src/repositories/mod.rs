//! Repository implementations for document store operations.

pub mod circle;

pub use circle::{CircleFeed, CircleRepository};
