//! Circle domain models for location sharing groups.

use serde::{Deserialize, Serialize};
use shared::validation::validate_not_blank;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use super::member::Member;

/// A named group of identities sharing location and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub id: String,
    pub name: String,
    pub code: String,
    pub invite_code: String,
    pub members: Vec<Member>,
}

impl Circle {
    /// Returns true if `member_id` has an entry in this circle.
    pub fn has_member(&self, member_id: Uuid) -> bool {
        self.members.iter().any(|m| m.id == member_id)
    }

    pub fn member(&self, member_id: Uuid) -> Option<&Member> {
        self.members.iter().find(|m| m.id == member_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Request payload for creating a circle.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCircleRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: String,
}

impl CreateCircleRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
        }
    }
}

/// Request payload for joining a circle by code.
///
/// The code is matched exactly as given; normalising case is the caller's job.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinCircleRequest {
    pub code: String,
}

impl JoinCircleRequest {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
        }
    }
}

impl Validate for JoinCircleRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(mut e) = validate_not_blank(&self.code) {
            e.message = Some("Please enter an invite code".into());
            errors.add("code", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_with(members: Vec<Member>) -> Circle {
        Circle {
            id: "c1".into(),
            name: "Family".into(),
            code: "ABC123".into(),
            invite_code: "ABC123".into(),
            members,
        }
    }

    #[test]
    fn test_membership_lookup() {
        let ana = Member::new(Uuid::new_v4(), "Ana");
        let circle = circle_with(vec![ana.clone()]);
        assert!(circle.has_member(ana.id));
        assert!(!circle.has_member(Uuid::new_v4()));
        assert_eq!(circle.member(ana.id).map(|m| m.name.as_str()), Some("Ana"));
        assert_eq!(circle.member_count(), 1);
    }

    #[test]
    fn test_create_circle_request_validation() {
        assert!(CreateCircleRequest::new("Family").validate().is_ok());
        assert!(CreateCircleRequest::new("   ").validate().is_err());
        assert!(CreateCircleRequest::new(&"x".repeat(101)).validate().is_err());
        assert_eq!(CreateCircleRequest::new("  Family  ").name, "Family");
    }

    #[test]
    fn test_join_circle_request_validation() {
        assert!(JoinCircleRequest::new("ABC123").validate().is_ok());
        assert!(JoinCircleRequest::new("abc123").validate().is_ok());
        assert!(JoinCircleRequest::new("").validate().is_err());
        assert!(JoinCircleRequest::new("  ").validate().is_err());
    }

    #[test]
    fn test_join_request_keeps_code_verbatim() {
        assert_eq!(JoinCircleRequest::new("abC12x").code, "abC12x");
    }
}
