//! Common test utilities for integration tests.
//!
//! Builds a [`CircleClient`] over the in-memory document store, in-memory
//! session storage, simulated sensors and a recording alert broadcaster.

// Helpers are shared by every integration test binary; not all use each one.
#![allow(dead_code)]

use circlelink_app::client::{CircleClient, Collaborators};
use circlelink_app::config::{Config, WriteMode};
use circlelink_app::sensors::{
    PermissionStatus, SimulatedBatterySensor, SimulatedPositioningSensor,
};
use circlelink_app::services::{DirectoryState, MemorySessionStorage};
use domain::models::{Circle, Identity};
use domain::services::alert::MockAlertBroadcaster;
use fake::faker::name::en::Name;
use fake::Fake;
use persistence::repositories::CircleRepository;
use persistence::store::InMemoryDocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const WAIT: Duration = Duration::from_secs(2);

/// Everything a test needs to drive one client and inspect its collaborators.
pub struct TestClient {
    pub client: CircleClient,
    pub store: InMemoryDocumentStore,
    pub session_storage: Arc<MemorySessionStorage>,
    pub positioning: Arc<SimulatedPositioningSensor>,
    pub battery: Arc<SimulatedBatterySensor>,
    pub alerts: Arc<MockAlertBroadcaster>,
}

pub struct TestClientBuilder {
    config: Config,
    store: InMemoryDocumentStore,
    session_storage: Arc<MemorySessionStorage>,
    positioning: Arc<SimulatedPositioningSensor>,
    alerts: Arc<MockAlertBroadcaster>,
}

impl TestClientBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            store: InMemoryDocumentStore::new(),
            session_storage: Arc::new(MemorySessionStorage::new()),
            positioning: Arc::new(SimulatedPositioningSensor::granted()),
            alerts: Arc::new(MockAlertBroadcaster::new()),
        }
    }

    /// Share a store with another client.
    pub fn store(mut self, store: &InMemoryDocumentStore) -> Self {
        self.store = store.clone();
        self
    }

    pub fn stored_identity(mut self, identity: Identity) -> Self {
        self.session_storage = Arc::new(MemorySessionStorage::with_identity(identity));
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.presence.write_mode = mode;
        self
    }

    pub fn positioning(mut self, sensor: SimulatedPositioningSensor) -> Self {
        self.positioning = Arc::new(sensor);
        self
    }

    pub fn failing_alerts(mut self) -> Self {
        self.alerts = Arc::new(MockAlertBroadcaster::failing());
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub async fn connect(self) -> TestClient {
        let battery = Arc::new(SimulatedBatterySensor::default());
        let client = CircleClient::connect(
            &self.config,
            Collaborators {
                store: Arc::new(self.store.clone()),
                session_storage: self.session_storage.clone(),
                positioning: self.positioning.clone(),
                battery: battery.clone(),
                alerts: self.alerts.clone(),
            },
        )
        .await;

        TestClient {
            client,
            store: self.store,
            session_storage: self.session_storage,
            positioning: self.positioning,
            battery,
            alerts: self.alerts,
        }
    }
}

/// A connected client with nobody signed in.
pub async fn test_client() -> TestClient {
    TestClientBuilder::new().connect().await
}

/// A connected client on `store`, signed in under a generated name.
pub async fn signed_in_client(store: &InMemoryDocumentStore) -> TestClient {
    let test = TestClientBuilder::new().store(store).connect().await;
    test.client.sign_in(Some(fake_name())).await;
    test
}

pub fn fake_name() -> String {
    Name().fake()
}

pub fn identity(test: &TestClient) -> Identity {
    test.client
        .session()
        .current_identity()
        .expect("client should be signed in")
}

/// Wait until the directory state satisfies `predicate`.
pub async fn wait_for_directory<F>(test: &TestClient, predicate: F) -> DirectoryState
where
    F: Fn(&DirectoryState) -> bool,
{
    wait_for(test.client.directory().subscribe(), predicate).await
}

/// Wait until a watch channel's value satisfies `predicate`.
pub async fn wait_for<T, F>(mut rx: watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            {
                let value = rx.borrow_and_update();
                if predicate(&value) {
                    return value.clone();
                }
            }
            rx.changed().await.expect("watch sender dropped");
        }
    })
    .await
    .expect("timed out waiting for state")
}

/// Create a circle and wait until it is the active one.
pub async fn create_active_circle(test: &TestClient, name: &str) -> Circle {
    let code = test
        .client
        .membership()
        .create_circle(name)
        .await
        .expect("create circle");
    let state = wait_for_directory(test, |s| {
        s.active_circle().map(|c| c.code == code).unwrap_or(false)
    })
    .await;
    state.active_circle().cloned().expect("active circle")
}

/// Read a circle straight from the store.
pub async fn stored_circle(store: &InMemoryDocumentStore, id: &str) -> Circle {
    CircleRepository::new(Arc::new(store.clone()))
        .find_by_id(id)
        .await
        .expect("store read")
        .expect("circle exists")
}

pub fn undetermined_positioning(grant_on_request: bool) -> SimulatedPositioningSensor {
    SimulatedPositioningSensor::new(PermissionStatus::Undetermined, grant_on_request)
}
