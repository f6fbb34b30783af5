//! Presence tracker: publishes accepted position samples and battery
//! snapshots through the [`PresencePublisher`].
//!
//! Works from the latest value of each source; samples that arrive while a
//! write is in flight are coalesced into the newest one. Failures are logged
//! per sample and tracking continues.

use domain::models::{BatterySnapshot, PositionSample};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::services::presence::PresencePublisher;

pub struct PresenceTracker {
    cancel: CancellationToken,
}

impl PresenceTracker {
    /// Start publishing. Values already present in the receivers are
    /// published first.
    pub fn spawn(
        publisher: Arc<PresencePublisher>,
        mut positions: watch::Receiver<Option<PositionSample>>,
        mut battery: watch::Receiver<Option<BatterySnapshot>>,
    ) -> Self {
        positions.mark_changed();
        battery.mark_changed();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut positions_open = true;
            let mut battery_open = true;

            while positions_open || battery_open {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = positions.changed(), if positions_open => {
                        if changed.is_err() {
                            positions_open = false;
                            continue;
                        }
                        let sample = *positions.borrow_and_update();
                        if let Some(sample) = sample {
                            if let Err(e) = publisher.update_member_location(sample.coords).await {
                                warn!(error = %e, "Failed to publish location");
                            }
                        }
                    }
                    changed = battery.changed(), if battery_open => {
                        if changed.is_err() {
                            battery_open = false;
                            continue;
                        }
                        let snapshot = *battery.borrow_and_update();
                        if let Some(snapshot) = snapshot {
                            if let Err(e) = publisher.update_member_battery(snapshot).await {
                                warn!(error = %e, "Failed to publish battery");
                            }
                        }
                    }
                }
            }
            debug!("Presence tracker stopped");
        });

        Self { cancel }
    }

    pub fn stop(self) {
        self.cancel.cancel();
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
