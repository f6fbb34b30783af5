//! Composition root: builds the services over their collaborators and keeps
//! the session and the circle directory in step.

use domain::errors::CircleResult;
use domain::models::Identity;
use domain::services::alert::AlertBroadcaster;
use persistence::repositories::CircleRepository;
use persistence::store::DocumentStore;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::config::Config;
use crate::sensors::{BatterySensor, PositioningSensor};
use crate::services::{
    BatteryMonitor, CircleDirectory, GeolocationFeed, MembershipService, NoticeBoard,
    PresencePublisher, PresenceTracker, SessionManager, SessionStorage, SosController,
};

/// External collaborators the client runs against.
pub struct Collaborators {
    pub store: Arc<dyn DocumentStore>,
    pub session_storage: Arc<dyn SessionStorage>,
    pub positioning: Arc<dyn PositioningSensor>,
    pub battery: Arc<dyn BatterySensor>,
    pub alerts: Arc<dyn AlertBroadcaster>,
}

pub struct CircleClient {
    session: Arc<SessionManager>,
    directory: Arc<CircleDirectory>,
    membership: MembershipService,
    presence: Arc<PresencePublisher>,
    geolocation: Arc<GeolocationFeed>,
    battery: Arc<BatteryMonitor>,
    sos: SosController,
    notices: NoticeBoard,
    tracker: Mutex<Option<PresenceTracker>>,
    fallback_name: String,
}

impl CircleClient {
    /// Wire every service, restore a stored session and bind the directory
    /// to it.
    pub async fn connect(config: &Config, deps: Collaborators) -> Self {
        let repository = CircleRepository::new(deps.store);
        let notices = NoticeBoard::new();

        let session = Arc::new(SessionManager::new(deps.session_storage));
        let directory = Arc::new(CircleDirectory::new(repository.clone()));
        let membership = MembershipService::new(
            repository.clone(),
            Arc::clone(&session),
            config.membership.clone(),
        );
        let presence = Arc::new(PresencePublisher::new(
            repository,
            Arc::clone(&session),
            Arc::clone(&directory),
            config.presence.write_mode,
        ));
        let geolocation = Arc::new(
            GeolocationFeed::new(deps.positioning, config.location.clone(), notices.clone()).await,
        );
        let battery = Arc::new(BatteryMonitor::new(deps.battery));
        let sos = SosController::new(
            Arc::clone(&session),
            Arc::clone(&directory),
            Arc::clone(&geolocation),
            deps.alerts,
            notices.clone(),
            config.membership.default_display_name.clone(),
        );

        let client = Self {
            session,
            directory,
            membership,
            presence,
            geolocation,
            battery,
            sos,
            notices,
            tracker: Mutex::new(None),
            fallback_name: config.membership.default_display_name.clone(),
        };

        let restored = client.session.restore().await;
        client.directory.set_identity(restored);
        client
    }

    pub async fn sign_in(&self, display_name: Option<String>) -> Identity {
        let identity = self.session.sign_in(display_name).await;
        self.directory.set_identity(Some(identity.clone()));
        identity
    }

    /// Sign out. The directory is emptied before the stored session is
    /// cleared.
    pub async fn sign_out(&self) -> Option<Identity> {
        self.stop_tracking();
        self.sos.cancel();
        self.directory.set_identity(None);
        self.session.sign_out().await
    }

    /// Start the location feed and battery monitor and publish their values
    /// into the active circle.
    pub async fn start_tracking(&self) -> CircleResult<()> {
        self.geolocation.start_tracking().await?;
        self.battery.start().await?;

        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        if tracker.is_none() {
            *tracker = Some(PresenceTracker::spawn(
                Arc::clone(&self.presence),
                self.geolocation.subscribe(),
                self.battery.subscribe(),
            ));
            info!("Presence tracking started");
        }
        Ok(())
    }

    /// Stop all tracking. Returns false if nothing was running.
    pub fn stop_tracking(&self) -> bool {
        let tracker = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let had_tracker = tracker.is_some();
        if let Some(tracker) = tracker {
            tracker.stop();
        }
        let released_location = self.geolocation.stop_tracking();
        let released_battery = self.battery.stop();
        had_tracker || released_location || released_battery
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Name shown for an identity that has no display name.
    pub fn fallback_name(&self) -> &str {
        &self.fallback_name
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn directory(&self) -> &CircleDirectory {
        &self.directory
    }

    pub fn membership(&self) -> &MembershipService {
        &self.membership
    }

    pub fn presence(&self) -> &PresencePublisher {
        &self.presence
    }

    pub fn geolocation(&self) -> &GeolocationFeed {
        &self.geolocation
    }

    pub fn battery(&self) -> &BatteryMonitor {
        &self.battery
    }

    pub fn sos(&self) -> &SosController {
        &self.sos
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }
}
