//! Battery monitor: merges the sensor's level and charging state into
//! [`BatterySnapshot`]s.

use domain::errors::CircleResult;
use domain::models::{BatterySnapshot, BatteryState};
use persistence::store::SubscriptionHandle;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sensors::{BatterySensor, SensorStream};

#[derive(Default)]
struct Listening {
    handles: Vec<SubscriptionHandle>,
    task: Option<JoinHandle<()>>,
}

pub struct BatteryMonitor {
    sensor: Arc<dyn BatterySensor>,
    latest: Arc<watch::Sender<Option<BatterySnapshot>>>,
    listening: Mutex<Listening>,
}

/// Last raw reading from each listener.
#[derive(Debug, Clone, Copy)]
struct Reading {
    level: f32,
    state: BatteryState,
}

impl Reading {
    fn publish(&self, latest: &watch::Sender<Option<BatterySnapshot>>) {
        match BatterySnapshot::from_sensor(self.level, self.state) {
            Ok(snapshot) => {
                latest.send_replace(Some(snapshot));
            }
            Err(e) => warn!(level = self.level, error = %e, "Ignoring battery reading"),
        }
    }
}

impl BatteryMonitor {
    pub fn new(sensor: Arc<dyn BatterySensor>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            sensor,
            latest: Arc::new(latest),
            listening: Mutex::new(Listening::default()),
        }
    }

    fn listening(&self) -> MutexGuard<'_, Listening> {
        self.listening.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.listening().task.is_some()
    }

    /// Publish an initial snapshot from one-shot reads, then follow level and
    /// state changes. Starting twice is a no-op.
    pub async fn start(&self) -> CircleResult<()> {
        if self.is_running() {
            return Ok(());
        }

        let reading = Reading {
            level: self.sensor.battery_level().await?,
            state: self.sensor.battery_state().await?,
        };
        reading.publish(&self.latest);

        let levels = self.sensor.subscribe_level();
        let states = self.sensor.subscribe_state();

        let mut listening = self.listening();
        if listening.task.is_some() {
            return Ok(());
        }
        listening.handles = vec![levels.handle(), states.handle()];
        listening.task = Some(tokio::spawn(Self::run(
            reading,
            levels,
            states,
            Arc::clone(&self.latest),
        )));
        info!(level = reading.level, state = ?reading.state, "Battery monitor started");
        Ok(())
    }

    async fn run(
        mut reading: Reading,
        mut levels: SensorStream<f32>,
        mut states: SensorStream<BatteryState>,
        latest: Arc<watch::Sender<Option<BatterySnapshot>>>,
    ) {
        loop {
            tokio::select! {
                level = levels.next() => match level {
                    Some(level) => reading.level = level,
                    None => break,
                },
                state = states.next() => match state {
                    Some(state) => reading.state = state,
                    None => break,
                },
            }
            reading.publish(&latest);
        }
        debug!("Battery listeners closed");
    }

    /// Release both sensor listeners. Returns false if not running.
    pub fn stop(&self) -> bool {
        let mut listening = self.listening();
        let Some(task) = listening.task.take() else {
            return false;
        };
        task.abort();
        for handle in listening.handles.drain(..) {
            handle.unsubscribe();
        }
        info!("Battery monitor stopped");
        true
    }

    pub fn latest(&self) -> Option<BatterySnapshot> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<BatterySnapshot>> {
        self.latest.subscribe()
    }
}

impl Drop for BatteryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
