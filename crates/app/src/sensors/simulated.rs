//! Simulated sensors.
//!
//! Values are pushed in by hand (shell commands or tests) and fanned out to
//! every live registration.

use chrono::Utc;
use domain::models::{BatteryState, Coordinates, PositionSample};
use persistence::store::SubscriptionHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

use super::{BatterySensor, PermissionStatus, PositioningSensor, SensorError, SensorStream, WatchOptions};

/// Registered listeners of one value kind.
struct Listeners<T> {
    next_id: AtomicU64,
    senders: Mutex<HashMap<u64, mpsc::UnboundedSender<T>>>,
}

impl<T: Clone + Send + 'static> Listeners<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            senders: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<T>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(self: &Arc<Self>) -> SensorStream<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);

        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = SubscriptionHandle::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.lock().remove(&id);
            }
        });
        SensorStream::new(rx, handle)
    }

    fn emit(&self, value: T) {
        self.lock().retain(|_, tx| tx.send(value.clone()).is_ok());
    }

    fn count(&self) -> usize {
        self.lock().len()
    }
}

#[derive(Debug, Clone, Copy)]
struct PermissionState {
    foreground: PermissionStatus,
    background: PermissionStatus,
    /// Answer given when the user is prompted.
    grant_on_request: bool,
}

/// Positioning sensor fed by [`SimulatedPositioningSensor::push_fix`].
pub struct SimulatedPositioningSensor {
    permissions: Mutex<PermissionState>,
    watchers: Arc<Listeners<PositionSample>>,
    last_options: Mutex<Option<WatchOptions>>,
    unavailable: Mutex<Option<String>>,
    prompts: AtomicU64,
}

impl Default for SimulatedPositioningSensor {
    fn default() -> Self {
        Self::new(PermissionStatus::Undetermined, true)
    }
}

impl SimulatedPositioningSensor {
    /// Sensor with the given initial foreground permission; prompting grants
    /// access iff `grant_on_request`.
    pub fn new(foreground: PermissionStatus, grant_on_request: bool) -> Self {
        Self {
            permissions: Mutex::new(PermissionState {
                foreground,
                background: PermissionStatus::Undetermined,
                grant_on_request,
            }),
            watchers: Listeners::new(),
            last_options: Mutex::new(None),
            unavailable: Mutex::new(None),
            prompts: AtomicU64::new(0),
        }
    }

    /// Sensor that already holds foreground permission.
    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted, true)
    }

    /// Sensor whose permission prompts are refused.
    pub fn denied() -> Self {
        Self::new(PermissionStatus::Denied, false)
    }

    fn permissions(&self) -> MutexGuard<'_, PermissionState> {
        self.permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent watch requests fail.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.lock().unwrap_or_else(PoisonError::into_inner) =
            reason.map(str::to_string);
    }

    /// Deliver a sample to every active watch.
    pub fn push_sample(&self, sample: PositionSample) {
        self.watchers.emit(sample);
    }

    /// Deliver a fix captured now.
    pub fn push_fix(&self, latitude: f64, longitude: f64) {
        self.push_sample(PositionSample::new(
            Coordinates::new(latitude, longitude),
            Utc::now(),
        ));
    }

    /// Number of live watch registrations.
    pub fn watcher_count(&self) -> usize {
        self.watchers.count()
    }

    /// Options of the most recent watch request.
    pub fn last_options(&self) -> Option<WatchOptions> {
        *self.last_options.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of permission prompts shown so far.
    pub fn prompt_count(&self) -> u64 {
        self.prompts.load(Ordering::Relaxed)
    }

    pub fn background_permission(&self) -> PermissionStatus {
        self.permissions().background
    }

    fn answer(&self) -> PermissionStatus {
        self.prompts.fetch_add(1, Ordering::Relaxed);
        if self.permissions().grant_on_request {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }
}

#[async_trait::async_trait]
impl PositioningSensor for SimulatedPositioningSensor {
    async fn foreground_permission(&self) -> PermissionStatus {
        self.permissions().foreground
    }

    async fn request_foreground_permission(&self) -> PermissionStatus {
        let status = self.answer();
        self.permissions().foreground = status;
        status
    }

    async fn request_background_permission(&self) -> PermissionStatus {
        let status = self.answer();
        self.permissions().background = status;
        status
    }

    async fn watch_position(
        &self,
        options: WatchOptions,
    ) -> Result<SensorStream<PositionSample>, SensorError> {
        if !self.permissions().foreground.is_granted() {
            return Err(SensorError::PermissionDenied(
                "foreground location access not granted".to_string(),
            ));
        }
        if let Some(reason) = self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(SensorError::Unavailable(reason));
        }

        *self.last_options.lock().unwrap_or_else(PoisonError::into_inner) = Some(options);
        Ok(self.watchers.register())
    }
}

#[derive(Debug, Clone, Copy)]
struct BatteryReading {
    level: f32,
    state: BatteryState,
}

/// Battery sensor driven by [`SimulatedBatterySensor::set_level`] and
/// [`SimulatedBatterySensor::set_state`].
pub struct SimulatedBatterySensor {
    reading: Mutex<BatteryReading>,
    level_listeners: Arc<Listeners<f32>>,
    state_listeners: Arc<Listeners<BatteryState>>,
}

impl Default for SimulatedBatterySensor {
    fn default() -> Self {
        Self::new(1.0, BatteryState::Full)
    }
}

impl SimulatedBatterySensor {
    pub fn new(level: f32, state: BatteryState) -> Self {
        Self {
            reading: Mutex::new(BatteryReading { level, state }),
            level_listeners: Listeners::new(),
            state_listeners: Listeners::new(),
        }
    }

    fn reading(&self) -> MutexGuard<'_, BatteryReading> {
        self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_level(&self, level: f32) {
        self.reading().level = level;
        self.level_listeners.emit(level);
    }

    pub fn set_state(&self, state: BatteryState) {
        self.reading().state = state;
        self.state_listeners.emit(state);
    }

    pub fn listener_count(&self) -> usize {
        self.level_listeners.count() + self.state_listeners.count()
    }
}

#[async_trait::async_trait]
impl BatterySensor for SimulatedBatterySensor {
    async fn battery_level(&self) -> Result<f32, SensorError> {
        Ok(self.reading().level)
    }

    async fn battery_state(&self) -> Result<BatteryState, SensorError> {
        Ok(self.reading().state)
    }

    fn subscribe_level(&self) -> SensorStream<f32> {
        self.level_listeners.register()
    }

    fn subscribe_state(&self) -> SensorStream<BatteryState> {
        self.state_listeners.register()
    }
}
