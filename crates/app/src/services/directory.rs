//! Circle directory: the live set of circles the signed-in identity belongs
//! to, plus the active circle selection.
//!
//! Each identity binding owns one live query over the circles collection.
//! Every snapshot fully replaces the visible set. Rebinding or teardown bumps
//! a generation counter under the same lock that applies snapshots, so a
//! snapshot from a released binding is never applied.

use domain::errors::{CircleError, CircleResult};
use domain::models::{Circle, Identity};
use persistence::repositories::{CircleFeed, CircleRepository};
use persistence::store::SubscriptionHandle;
use persistence::StoreResult;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of the directory as seen by the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryState {
    pub circles: Vec<Circle>,
    pub active_circle_id: Option<String>,
    /// True until the first result of the current binding arrives.
    pub loading: bool,
    /// Last live query error; the circle set is stale while this is set.
    pub last_error: Option<String>,
}

impl DirectoryState {
    pub fn active_circle(&self) -> Option<&Circle> {
        let id = self.active_circle_id.as_deref()?;
        self.circles.iter().find(|c| c.id == id)
    }

    fn apply_snapshot(&mut self, member_id: uuid::Uuid, all: Vec<Circle>) {
        self.circles = all.into_iter().filter(|c| c.has_member(member_id)).collect();
        let keep = self
            .active_circle_id
            .as_deref()
            .map_or(false, |id| self.circles.iter().any(|c| c.id == id));
        if !keep {
            self.active_circle_id = self.circles.first().map(|c| c.id.clone());
        }
        self.loading = false;
        self.last_error = None;
    }
}

#[derive(Default)]
struct Binding {
    generation: u64,
    identity: Option<Identity>,
    subscription: Option<SubscriptionHandle>,
    task: Option<JoinHandle<()>>,
}

impl Binding {
    fn release(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Shared {
    binding: Mutex<Binding>,
    state: watch::Sender<DirectoryState>,
}

impl Shared {
    fn binding(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, generation: u64, snapshot: StoreResult<Vec<Circle>>) {
        let binding = self.binding();
        if binding.generation != generation {
            debug!(generation, "Dropping snapshot from released binding");
            return;
        }
        let Some(identity) = binding.identity.as_ref() else {
            return;
        };

        match snapshot {
            Ok(all) => {
                let member_id = identity.id;
                self.state.send_modify(|s| s.apply_snapshot(member_id, all));
            }
            Err(e) => {
                warn!(user_id = %identity.id, error = %e, "Circle subscription error, serving last known circles");
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.last_error = Some(e.to_string());
                });
            }
        }
    }
}

/// Live, subscribed set of circles for the signed-in identity.
pub struct CircleDirectory {
    repository: CircleRepository,
    shared: Arc<Shared>,
}

impl CircleDirectory {
    pub fn new(repository: CircleRepository) -> Self {
        let (state, _) = watch::channel(DirectoryState::default());
        Self {
            repository,
            shared: Arc::new(Shared {
                binding: Mutex::new(Binding::default()),
                state,
            }),
        }
    }

    /// Bind the directory to `identity`, or tear it down with `None`.
    ///
    /// Teardown is synchronous: when this returns the circle set and the
    /// selection are already empty and loading is false. Must be called from
    /// within a Tokio runtime when `identity` is `Some`.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let mut binding = self.shared.binding();

        let same_identity = matches!(
            (binding.identity.as_ref(), identity.as_ref()),
            (Some(current), Some(next)) if current.id == next.id
        );
        if same_identity && binding.subscription.is_some() {
            binding.identity = identity;
            return;
        }

        binding.release();
        binding.identity = identity.clone();

        let Some(identity) = identity else {
            self.shared.state.send_replace(DirectoryState::default());
            debug!("Circle directory cleared");
            return;
        };

        self.shared.state.send_replace(DirectoryState {
            loading: true,
            ..DirectoryState::default()
        });

        let feed = match self.repository.subscribe() {
            Ok(feed) => feed,
            Err(e) => {
                warn!(user_id = %identity.id, error = %e, "Failed to subscribe to circles");
                self.shared.state.send_modify(|s| {
                    s.loading = false;
                    s.last_error = Some(e.to_string());
                });
                return;
            }
        };

        binding.subscription = Some(feed.handle());
        binding.task = Some(tokio::spawn(Self::run(
            Arc::clone(&self.shared),
            binding.generation,
            feed,
        )));
        info!(user_id = %identity.id, generation = binding.generation, "Circle directory bound");
    }

    async fn run(shared: Arc<Shared>, generation: u64, mut feed: CircleFeed) {
        while let Some(snapshot) = feed.next().await {
            shared.apply(generation, snapshot);
        }
        debug!(generation, "Circle feed closed");
    }

    /// Change the active circle. Ids not in the current set are rejected.
    pub fn set_active_circle(&self, circle_id: Option<&str>) -> CircleResult<()> {
        let mut result = Ok(());
        self.shared.state.send_if_modified(|s| match circle_id {
            None => {
                let changed = s.active_circle_id.is_some();
                s.active_circle_id = None;
                changed
            }
            Some(id) if s.circles.iter().any(|c| c.id == id) => {
                let changed = s.active_circle_id.as_deref() != Some(id);
                s.active_circle_id = Some(id.to_string());
                changed
            }
            Some(id) => {
                result = Err(CircleError::CircleNotFound(id.to_string()));
                false
            }
        });
        result
    }

    pub fn state(&self) -> DirectoryState {
        self.shared.state.borrow().clone()
    }

    pub fn circles(&self) -> Vec<Circle> {
        self.shared.state.borrow().circles.clone()
    }

    pub fn active_circle(&self) -> Option<Circle> {
        self.shared.state.borrow().active_circle().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    pub fn identity(&self) -> Option<Identity> {
        self.shared.binding().identity.clone()
    }

    /// Observe directory changes.
    pub fn subscribe(&self) -> watch::Receiver<DirectoryState> {
        self.shared.state.subscribe()
    }
}

impl Drop for CircleDirectory {
    fn drop(&mut self) {
        self.shared.binding().release();
    }
}
