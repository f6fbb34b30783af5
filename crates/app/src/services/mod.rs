//! Client services.

pub mod battery;
pub mod directory;
pub mod geolocation;
pub mod membership;
pub mod notice;
pub mod presence;
pub mod session;
pub mod sos;
pub mod tracker;

pub use battery::BatteryMonitor;
pub use directory::{CircleDirectory, DirectoryState};
pub use geolocation::{GeolocationFeed, IntervalPolicy};
pub use membership::MembershipService;
pub use notice::{next_notice, NoticeBoard, UserNotice};
pub use presence::PresencePublisher;
pub use session::{
    FileSessionStorage, MemorySessionStorage, SessionManager, SessionState, SessionStorage,
    SessionStorageError,
};
pub use sos::SosController;
pub use tracker::PresenceTracker;
