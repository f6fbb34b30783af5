//! Shared utilities and common types for the CircleLink client.
//!
//! This crate provides common functionality used across all other crates:
//! - Join code generation and normalisation
//! - Common validation logic

pub mod join_code;
pub mod validation;
