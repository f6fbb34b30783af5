//! Domain services for CircleLink.
//!
//! Services describe collaborators that operate on domain models.

pub mod alert;

pub use alert::{AlertBroadcaster, AlertResult, AlertType, MockAlertBroadcaster, SosAlertPayload};
