//! Circle entity (document field mapping).

use domain::models::{Circle, Member};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::store::{Document, FieldMap};

/// Collection holding one document per circle.
pub const CIRCLES_COLLECTION: &str = "circles";

/// Array field holding the member entries.
pub const MEMBERS_FIELD: &str = "members";

/// Field map of a circle document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleDocument {
    pub name: String,
    #[serde(default)]
    pub members: Vec<Member>,
    pub code: String,
    /// Same value as `code`; kept as a separate field for clients that read it.
    pub invite_code: String,
}

impl CircleDocument {
    /// A new circle whose only member is its creator.
    pub fn new(name: &str, code: &str, creator: Member) -> Self {
        Self {
            name: name.to_string(),
            members: vec![creator],
            code: code.to_string(),
            invite_code: code.to_string(),
        }
    }

    pub fn into_fields(self) -> StoreResult<FieldMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Malformed(format!(
                "circle serialized to {}",
                other
            ))),
        }
    }

    pub fn from_fields(fields: &FieldMap) -> StoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(fields.clone()))?)
    }

    pub fn into_circle(self, id: String) -> Circle {
        Circle {
            id,
            name: self.name,
            code: self.code,
            invite_code: self.invite_code,
            members: self.members,
        }
    }
}

impl TryFrom<&Document> for Circle {
    type Error = StoreError;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        CircleDocument::from_fields(&doc.fields)
            .map(|d| d.into_circle(doc.id.clone()))
            .map_err(|e| StoreError::Malformed(format!("circle {}: {}", doc.id, e)))
    }
}
