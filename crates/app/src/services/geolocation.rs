//! Geolocation feed: permission handling and the filtered position stream.

use domain::errors::{CircleError, CircleResult};
use domain::models::PositionSample;
use geo::{HaversineDistance, Point};
use persistence::store::SubscriptionHandle;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::config::LocationConfig;
use crate::sensors::{PermissionStatus, PositioningSensor, SensorStream, WatchOptions};
use crate::services::notice::NoticeBoard;

const PERMISSION_NOTICE_TITLE: &str = "Location Permission Required";
const PERMISSION_NOTICE_MESSAGE: &str =
    "CircleLink needs location access to share your location with your safety circle.";

/// Minimum spacing between accepted samples.
///
/// A sample is dropped only when it is both sooner than `time_interval` and
/// closer than `distance_interval_m` to the last accepted one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalPolicy {
    pub time_interval: Duration,
    pub distance_interval_m: f64,
}

impl IntervalPolicy {
    pub fn from_config(config: &LocationConfig) -> Self {
        Self {
            time_interval: Duration::from_millis(config.time_interval_ms),
            distance_interval_m: config.distance_interval_m,
        }
    }

    pub fn accepts(&self, last: Option<&PositionSample>, next: &PositionSample) -> bool {
        let Some(last) = last else {
            return true;
        };

        let elapsed = (next.captured_at - last.captured_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let too_soon = elapsed < self.time_interval;
        let too_close = distance_m(last, next) < self.distance_interval_m;
        !(too_soon && too_close)
    }
}

/// Great-circle distance between two samples, in meters.
pub fn distance_m(a: &PositionSample, b: &PositionSample) -> f64 {
    let from = Point::new(a.coords.longitude, a.coords.latitude);
    let to = Point::new(b.coords.longitude, b.coords.latitude);
    from.haversine_distance(&to)
}

#[derive(Default)]
struct Tracking {
    registration: Option<SubscriptionHandle>,
    task: Option<JoinHandle<()>>,
}

/// Wraps the positioning sensor; owns permission state and the single
/// active position watch.
pub struct GeolocationFeed {
    sensor: Arc<dyn PositioningSensor>,
    config: LocationConfig,
    notices: NoticeBoard,
    permission: watch::Sender<bool>,
    latest: Arc<watch::Sender<Option<PositionSample>>>,
    tracking: Mutex<Tracking>,
    start_lock: tokio::sync::Mutex<()>,
}

impl GeolocationFeed {
    /// Build the feed and read the current foreground permission.
    pub async fn new(
        sensor: Arc<dyn PositioningSensor>,
        config: LocationConfig,
        notices: NoticeBoard,
    ) -> Self {
        let granted = sensor.foreground_permission().await.is_granted();
        let (permission, _) = watch::channel(granted);
        let (latest, _) = watch::channel(None);
        Self {
            sensor,
            config,
            notices,
            permission,
            latest: Arc::new(latest),
            tracking: Mutex::new(Tracking::default()),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_permission(&self) -> bool {
        *self.permission.borrow()
    }

    /// Prompt for foreground access and, when configured, background access.
    ///
    /// Denial posts a single notice and fails; there is no retry until the
    /// next explicit request.
    pub async fn request_permission(&self) -> CircleResult<()> {
        let status = self.sensor.request_foreground_permission().await;
        if !status.is_granted() {
            self.permission.send_replace(false);
            self.notices
                .post(PERMISSION_NOTICE_TITLE, PERMISSION_NOTICE_MESSAGE);
            warn!(?status, "Foreground location permission denied");
            return Err(CircleError::SensorPermissionDenied(
                "foreground location access".to_string(),
            ));
        }

        if self.config.request_background {
            let background = self.sensor.request_background_permission().await;
            if background != PermissionStatus::Granted {
                // Foreground tracking still works without it.
                warn!(status = ?background, "Background location permission not granted");
            }
        }

        self.permission.send_replace(true);
        info!("Location permission granted");
        Ok(())
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking()
            .registration
            .as_ref()
            .map_or(false, SubscriptionHandle::is_active)
    }

    /// Start watching the position. Starting while already tracking is a
    /// no-op.
    pub async fn start_tracking(&self) -> CircleResult<()> {
        let _guard = self.start_lock.lock().await;
        if self.is_tracking() {
            debug!("Location tracking already running");
            return Ok(());
        }

        if !self.has_permission() {
            self.request_permission().await?;
        }

        let options = WatchOptions {
            accuracy: self.config.accuracy,
            time_interval_ms: self.config.time_interval_ms,
            distance_interval_m: self.config.distance_interval_m,
        };
        let stream = self.sensor.watch_position(options).await.map_err(|e| {
            warn!(error = %e, "Failed to start location tracking");
            CircleError::from(e)
        })?;

        let registration = stream.handle();
        let task = tokio::spawn(Self::run(
            stream,
            IntervalPolicy::from_config(&self.config),
            Arc::clone(&self.latest),
        ));

        let mut tracking = self.tracking();
        tracking.registration = Some(registration);
        tracking.task = Some(task);
        info!(accuracy = %options.accuracy, "Location tracking started");
        Ok(())
    }

    async fn run(
        mut stream: SensorStream<PositionSample>,
        policy: IntervalPolicy,
        latest: Arc<watch::Sender<Option<PositionSample>>>,
    ) {
        let mut last_accepted: Option<PositionSample> = None;
        while let Some(sample) = stream.next().await {
            if let Err(e) = sample.validate() {
                warn!(error = %e, "Discarding invalid position sample");
                continue;
            }
            if !policy.accepts(last_accepted.as_ref(), &sample) {
                debug!("Position sample inside interval, skipped");
                continue;
            }
            last_accepted = Some(sample);
            latest.send_replace(Some(sample));
        }
    }

    /// Stop watching. Returns true only for the call that released the
    /// sensor registration.
    pub fn stop_tracking(&self) -> bool {
        let mut tracking = self.tracking();
        if let Some(task) = tracking.task.take() {
            task.abort();
        }
        let released = tracking
            .registration
            .take()
            .map_or(false, |handle| handle.unsubscribe());
        if released {
            info!("Location tracking stopped");
        }
        released
    }

    /// Latest accepted sample, if any.
    pub fn latest(&self) -> Option<PositionSample> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PositionSample>> {
        self.latest.subscribe()
    }
}

impl Drop for GeolocationFeed {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}
