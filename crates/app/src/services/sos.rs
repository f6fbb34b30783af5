//! SOS alert dispatcher.
//!
//! `Idle -> Confirming -> Counting(10..=1) -> Sent -> Idle`, with
//! `Confirming -> Idle` on decline and `Counting(n) -> Idle` on cancel.
//!
//! The countdown runs as a task on a one-second interval. Each tick and each
//! cancel take the same lock and check the countdown's session id, so a
//! cancel that wins the race on the last tick suppresses the send and a
//! cancel that loses it finds nothing left to cancel.

use chrono::Utc;
use domain::errors::{CircleError, CircleResult};
use domain::models::{Circle, Identity, SosState, SOS_COUNTDOWN_SECS};
use domain::services::alert::{AlertBroadcaster, AlertResult, AlertType, SosAlertPayload};
use metrics::counter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::directory::CircleDirectory;
use crate::services::geolocation::GeolocationFeed;
use crate::services::notice::NoticeBoard;
use crate::services::session::SessionManager;

const TICK: Duration = Duration::from_secs(1);

/// Who the alert is from and which circle it goes to, fixed when SOS is requested.
#[derive(Debug, Clone)]
struct Target {
    circle: Circle,
    sender: Identity,
}

struct Countdown {
    session_id: Uuid,
    remaining: u32,
    target: Target,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Machine {
    /// Circle/sender captured while waiting for confirmation.
    pending: Option<Target>,
    countdown: Option<Countdown>,
}

struct Inner {
    state: watch::Sender<SosState>,
    machine: Mutex<Machine>,
    broadcaster: Arc<dyn AlertBroadcaster>,
    geolocation: Arc<GeolocationFeed>,
    notices: NoticeBoard,
    sender_fallback_name: String,
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> SosState {
        *self.state.borrow()
    }
}

pub struct SosController {
    inner: Arc<Inner>,
    session: Arc<SessionManager>,
    directory: Arc<CircleDirectory>,
}

impl SosController {
    pub fn new(
        session: Arc<SessionManager>,
        directory: Arc<CircleDirectory>,
        geolocation: Arc<GeolocationFeed>,
        broadcaster: Arc<dyn AlertBroadcaster>,
        notices: NoticeBoard,
        sender_fallback_name: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SosState::Idle);
        Self {
            inner: Arc::new(Inner {
                state,
                machine: Mutex::new(Machine::default()),
                broadcaster,
                geolocation,
                notices,
                sender_fallback_name: sender_fallback_name.into(),
            }),
            session,
            directory,
        }
    }

    pub fn state(&self) -> SosState {
        self.inner.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SosState> {
        self.inner.state.subscribe()
    }

    /// SOS pressed: ask for confirmation.
    ///
    /// Without an active circle a notice is posted and the machine stays idle.
    pub fn request(&self) -> CircleResult<SosState> {
        let mut machine = self.inner.machine();
        match self.inner.current() {
            SosState::Idle => {}
            _ => return Err(CircleError::AlertAlreadyActive),
        }

        let Some(circle) = self.directory.active_circle() else {
            drop(machine);
            self.inner.notices.post(
                "No Safety Circle",
                "You need to create or join a safety circle before using the SOS feature.",
            );
            return Err(CircleError::NoActiveContext);
        };
        let sender = self
            .session
            .current_identity()
            .ok_or(CircleError::NotAuthenticated)?;

        machine.pending = Some(Target { circle, sender });
        self.inner.state.send_replace(SosState::Confirming);
        debug!("SOS awaiting confirmation");
        Ok(SosState::Confirming)
    }

    /// Confirmation accepted: start the countdown.
    pub fn confirm(&self) -> CircleResult<SosState> {
        let mut machine = self.inner.machine();
        let current = self.inner.current();
        if current != SosState::Confirming {
            return Err(invalid(current, "confirm"));
        }
        let Some(target) = machine.pending.take() else {
            return Err(invalid(current, "confirm"));
        };

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        info!(
            alert_session = %session_id,
            circle_id = %target.circle.id,
            "SOS countdown started"
        );
        machine.countdown = Some(Countdown {
            session_id,
            remaining: SOS_COUNTDOWN_SECS,
            target,
            cancel: cancel.clone(),
        });
        let state = SosState::Counting(SOS_COUNTDOWN_SECS);
        self.inner.state.send_replace(state);

        tokio::spawn(run_countdown(Arc::clone(&self.inner), session_id, cancel));
        Ok(state)
    }

    /// Confirmation declined.
    pub fn decline(&self) -> CircleResult<SosState> {
        let mut machine = self.inner.machine();
        let current = self.inner.current();
        if current != SosState::Confirming {
            return Err(invalid(current, "decline"));
        }
        machine.pending = None;
        self.inner.state.send_replace(SosState::Idle);
        debug!("SOS declined");
        Ok(SosState::Idle)
    }

    /// Abort a pending confirmation or a running countdown.
    ///
    /// Returns false when there was nothing to cancel, including when the
    /// countdown already reached zero and the alert is being sent.
    pub fn cancel(&self) -> bool {
        let mut machine = self.inner.machine();
        match self.inner.current() {
            SosState::Confirming => {
                machine.pending = None;
            }
            SosState::Counting(remaining) => {
                if let Some(countdown) = machine.countdown.take() {
                    countdown.cancel.cancel();
                    info!(
                        alert_session = %countdown.session_id,
                        remaining,
                        "SOS countdown cancelled"
                    );
                }
            }
            SosState::Idle | SosState::Sent => return false,
        }
        self.inner.state.send_replace(SosState::Idle);
        true
    }
}

impl Drop for SosController {
    fn drop(&mut self) {
        if let Some(countdown) = self.inner.machine().countdown.take() {
            countdown.cancel.cancel();
        }
    }
}

fn invalid(from: SosState, action: &'static str) -> CircleError {
    CircleError::InvalidTransition {
        from: from.to_string(),
        action,
    }
}

enum Tick {
    Continue,
    Fire(Target),
    Stale,
}

fn tick(inner: &Inner, session_id: Uuid) -> Tick {
    let mut machine = inner.machine();
    let Some(countdown) = machine.countdown.as_mut() else {
        return Tick::Stale;
    };
    if countdown.session_id != session_id {
        return Tick::Stale;
    }

    countdown.remaining = countdown.remaining.saturating_sub(1);
    if countdown.remaining > 0 {
        inner.state.send_replace(SosState::Counting(countdown.remaining));
        return Tick::Continue;
    }

    let Some(countdown) = machine.countdown.take() else {
        return Tick::Stale;
    };
    inner.state.send_replace(SosState::Sent);
    Tick::Fire(countdown.target)
}

async fn run_countdown(inner: Arc<Inner>, session_id: Uuid, cancel: CancellationToken) {
    let mut ticks = interval_at(Instant::now() + TICK, TICK);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(alert_session = %session_id, "Countdown task stopped");
                return;
            }
            _ = ticks.tick() => {
                match tick(&inner, session_id) {
                    Tick::Continue => {}
                    Tick::Stale => return,
                    Tick::Fire(target) => {
                        dispatch(&inner, session_id, target).await;
                        return;
                    }
                }
            }
        }
    }
}

async fn dispatch(inner: &Inner, session_id: Uuid, target: Target) {
    let payload = SosAlertPayload {
        alert_type: AlertType::Sos,
        alert_id: session_id,
        circle_id: target.circle.id.clone(),
        circle_name: target.circle.name.clone(),
        sender_id: target.sender.id,
        sender_name: target.sender.member_name(&inner.sender_fallback_name),
        location: inner
            .geolocation
            .latest()
            .map(|sample| sample.coords.stamped(sample.captured_at)),
        timestamp: Utc::now(),
    };

    match inner.broadcaster.broadcast_sos(payload).await {
        AlertResult::Sent => {
            counter!("sos_alerts_dispatched_total", "outcome" => "sent").increment(1);
            info!(alert_id = %session_id, circle_id = %target.circle.id, "SOS alert sent");
            inner.notices.post(
                "SOS Alert Sent",
                "Your emergency alert has been sent to all circle members with your current location.",
            );
        }
        AlertResult::Failed(reason) => {
            counter!("sos_alerts_dispatched_total", "outcome" => "failed").increment(1);
            error!(alert_id = %session_id, error = %reason, "SOS alert broadcast failed");
            inner.notices.post("SOS Alert Failed", &reason);
        }
    }

    let _machine = inner.machine();
    if inner.current() == SosState::Sent {
        inner.state.send_replace(SosState::Idle);
    } else {
        warn!(alert_id = %session_id, "SOS state changed during dispatch");
    }
}
