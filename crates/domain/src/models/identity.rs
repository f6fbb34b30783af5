//! Signed-in identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(id: Uuid, display_name: Option<String>) -> Self {
        Self { id, display_name }
    }

    /// Creates an identity with a fresh random id.
    pub fn generate(display_name: Option<String>) -> Self {
        Self::new(Uuid::new_v4(), display_name)
    }

    /// Name shown to other members, or `fallback` when unset or blank.
    pub fn member_name(&self, fallback: &str) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => fallback.to_string(),
        }
    }
}
