//! Persistence layer for the CircleLink client.
//!
//! This crate contains:
//! - The document store contract and an in-memory implementation
//! - Entity definitions (document field mappings)
//! - Repository implementations

pub mod entities;
pub mod error;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use error::{StoreError, StoreResult};
