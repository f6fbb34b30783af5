//! Domain layer for the CircleLink client.
//!
//! This crate contains:
//! - Domain models (Identity, Circle, Member, presence samples, SOS state)
//! - Domain service contracts (alert broadcasting)
//! - Domain error types

pub mod errors;
pub mod models;
pub mod services;

pub use errors::{CircleError, CircleResult};
