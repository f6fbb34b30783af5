//! Circle membership service: create circles and join them by code.
//!
//! Writes go to the shared circle documents; the new state reaches the UI
//! through the directory's live query, not through these return values.

use domain::errors::{CircleError, CircleResult};
use domain::models::{CreateCircleRequest, Identity, JoinCircleRequest, Member};
use persistence::repositories::CircleRepository;
use shared::join_code::generate_join_code;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::config::MembershipConfig;
use crate::services::session::SessionManager;

pub struct MembershipService {
    repository: CircleRepository,
    session: Arc<SessionManager>,
    config: MembershipConfig,
}

impl MembershipService {
    pub fn new(
        repository: CircleRepository,
        session: Arc<SessionManager>,
        config: MembershipConfig,
    ) -> Self {
        Self {
            repository,
            session,
            config,
        }
    }

    fn identity(&self) -> CircleResult<Identity> {
        self.session
            .current_identity()
            .ok_or(CircleError::NotAuthenticated)
    }

    /// Create a circle whose only member is the caller; returns its join code.
    ///
    /// Codes are drawn at random with no uniqueness check unless
    /// `ensure_unique_codes` is set, and even then two concurrent creators
    /// can still draw the same code.
    pub async fn create_circle(&self, name: &str) -> CircleResult<String> {
        let identity = self.identity()?;
        let request = CreateCircleRequest::new(name);
        request.validate()?;

        let code = if self.config.ensure_unique_codes {
            self.repository
                .generate_unique_code(generate_join_code, self.config.max_code_attempts)
                .await?
        } else {
            generate_join_code()
        };

        let creator = Member::from_identity(&identity, &self.config.default_display_name);
        let circle_id = self
            .repository
            .create_circle(&request.name, &code, creator)
            .await?;

        info!(
            circle_id = %circle_id,
            user_id = %identity.id,
            "Circle created"
        );
        Ok(code)
    }

    /// Add the caller to the circle whose code equals `code` exactly, and
    /// return that circle's id.
    ///
    /// Codes are matched as given; callers normalise case beforehand.
    /// Joining a circle twice is a no-op success: entries are unioned by
    /// member id and the existing entry is left untouched.
    pub async fn join_circle(&self, code: &str) -> CircleResult<String> {
        let identity = self.identity()?;
        let request = JoinCircleRequest::new(code);
        request.validate()?;

        let circle_id = self
            .repository
            .find_id_by_code(&request.code)
            .await?
            .ok_or(CircleError::InvalidCode)?;

        let member = Member::from_identity(&identity, &self.config.default_display_name);
        self.repository.add_member(&circle_id, &member).await?;

        debug!(code = %request.code, "Join code matched");
        info!(
            circle_id = %circle_id,
            user_id = %identity.id,
            "Joined circle"
        );
        Ok(circle_id)
    }
}
