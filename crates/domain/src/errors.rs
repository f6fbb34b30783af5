//! Error taxonomy shared by the membership, presence and alert flows.

use thiserror::Error;

/// Errors surfaced by circle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircleError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("No user or active circle")]
    NoActiveContext,

    #[error("Invalid circle code")]
    InvalidCode,

    #[error("Circle not found: {0}")]
    CircleNotFound(String),

    #[error("Not a member of circle {0}")]
    NotAMember(String),

    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Sensor permission denied: {0}")]
    SensorPermissionDenied(String),

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("An SOS alert is already in progress")]
    AlertAlreadyActive,

    #[error("Cannot {action} while SOS is {from}")]
    InvalidTransition { from: String, action: &'static str },
}

pub type CircleResult<T> = Result<T, CircleError>;

impl From<validator::ValidationErrors> for CircleError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |err| {
                    format!("{}: {}", field, shared::validation::describe(err))
                })
            })
            .collect();
        CircleError::Validation(messages.join(", "))
    }
}

impl From<validator::ValidationError> for CircleError {
    fn from(err: validator::ValidationError) -> Self {
        CircleError::Validation(shared::validation::describe(&err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(CircleError::InvalidCode.to_string(), "Invalid circle code");
        assert_eq!(
            CircleError::CircleNotFound("c1".into()).to_string(),
            "Circle not found: c1"
        );
        assert_eq!(
            CircleError::InvalidTransition {
                from: "idle".into(),
                action: "cancel"
            }
            .to_string(),
            "Cannot cancel while SOS is idle"
        );
    }

    #[test]
    fn test_from_validation_errors() {
        let err: CircleError = Named {
            name: String::new(),
        }
        .validate()
        .unwrap_err()
        .into();
        assert_eq!(err, CircleError::Validation("name: Name is required".into()));
    }

    #[test]
    fn test_from_validation_error() {
        let err: CircleError = shared::validation::validate_latitude(91.0)
            .unwrap_err()
            .into();
        assert!(matches!(err, CircleError::Validation(msg) if msg.contains("Latitude")));
    }
}
