//! Domain models for CircleLink.

pub mod battery;
pub mod circle;
pub mod identity;
pub mod location;
pub mod member;
pub mod sos;

pub use battery::{BatteryBand, BatterySnapshot, BatteryState};
pub use circle::{Circle, CreateCircleRequest, JoinCircleRequest};
pub use identity::Identity;
pub use location::{Coordinates, LocationAccuracy, LocationStamp, PositionSample};
pub use member::{format_last_seen, Member};
pub use sos::{SosState, SOS_COUNTDOWN_SECS};
