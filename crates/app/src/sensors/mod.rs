//! Device sensor collaborators.
//!
//! The positioning and battery sensors are owned by the platform. The client
//! only sees them through these traits; [`simulated`] provides in-process
//! implementations for the shell and for tests.

pub mod simulated;

pub use simulated::{SimulatedBatterySensor, SimulatedPositioningSensor};

use domain::errors::CircleError;
use domain::models::{BatteryState, LocationAccuracy, PositionSample};
use persistence::store::SubscriptionHandle;
use thiserror::Error;
use tokio::sync::mpsc;

/// Permission answer reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionStatus {
    #[default]
    Undetermined,
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Sensor errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

impl From<SensorError> for CircleError {
    fn from(err: SensorError) -> Self {
        match err {
            SensorError::PermissionDenied(msg) => CircleError::SensorPermissionDenied(msg),
            SensorError::Unavailable(msg) => CircleError::SensorUnavailable(msg),
        }
    }
}

/// Options for a position watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub accuracy: LocationAccuracy,
    pub time_interval_ms: u64,
    pub distance_interval_m: f64,
}

/// A registration on a sensor: values arrive in order until it is released.
///
/// Dropping the stream releases the registration.
#[derive(Debug)]
pub struct SensorStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    handle: SubscriptionHandle,
}

impl<T> SensorStream<T> {
    pub fn new(receiver: mpsc::UnboundedReceiver<T>, handle: SubscriptionHandle) -> Self {
        Self { receiver, handle }
    }

    /// Wait for the next value. `None` once released.
    pub async fn next(&mut self) -> Option<T> {
        if !self.handle.is_active() {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }
}

impl<T> Drop for SensorStream<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

/// Platform positioning API.
#[async_trait::async_trait]
pub trait PositioningSensor: Send + Sync {
    /// Current foreground permission, without prompting.
    async fn foreground_permission(&self) -> PermissionStatus;

    /// Prompt for foreground location access.
    async fn request_foreground_permission(&self) -> PermissionStatus;

    /// Prompt for background location access.
    async fn request_background_permission(&self) -> PermissionStatus;

    /// Start delivering position samples.
    async fn watch_position(
        &self,
        options: WatchOptions,
    ) -> Result<SensorStream<PositionSample>, SensorError>;
}

/// Platform battery API.
#[async_trait::async_trait]
pub trait BatterySensor: Send + Sync {
    /// Charge level as a fraction in 0.0..=1.0 (negative when unknown).
    async fn battery_level(&self) -> Result<f32, SensorError>;

    async fn battery_state(&self) -> Result<BatteryState, SensorError>;

    fn subscribe_level(&self) -> SensorStream<f32>;

    fn subscribe_state(&self) -> SensorStream<BatteryState>;
}
