//! Document store errors.

use domain::CircleError;
use thiserror::Error;

/// Errors returned by document store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Document {collection}/{id} not found")]
    DocumentNotFound { collection: String, id: String },

    #[error("No element with {key} = {value} in {id}.{field}")]
    ElementNotFound {
        id: String,
        field: String,
        key: String,
        value: String,
    },

    #[error("Malformed document: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for CircleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => CircleError::StoreUnavailable(msg),
            StoreError::DocumentNotFound { id, .. } => CircleError::CircleNotFound(id),
            StoreError::ElementNotFound { id, .. } => CircleError::NotAMember(id),
            StoreError::Malformed(msg) => {
                tracing::error!(error = %msg, "Malformed document in store");
                CircleError::StoreUnavailable(format!("malformed document: {}", msg))
            }
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}
