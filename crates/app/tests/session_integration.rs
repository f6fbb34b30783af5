//! Integration tests for session restore and sensor-driven tracking.

mod common;

use circlelink_app::client::{CircleClient, Collaborators};
use circlelink_app::config::Config;
use circlelink_app::sensors::{
    PermissionStatus, SimulatedBatterySensor, SimulatedPositioningSensor,
};
use circlelink_app::services::FileSessionStorage;
use common::{
    create_active_circle, fake_name, identity, signed_in_client, stored_circle,
    undetermined_positioning, wait_for, wait_for_directory, TestClientBuilder,
};
use domain::errors::CircleError;
use domain::models::{BatteryState, Coordinates};
use domain::services::alert::MockAlertBroadcaster;
use persistence::store::InMemoryDocumentStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_restored_session_binds_directory() {
    let store = InMemoryDocumentStore::new();
    let first = signed_in_client(&store).await;
    let circle = create_active_circle(&first, "Family").await;
    let me = identity(&first);
    drop(first);

    let restarted = TestClientBuilder::new()
        .store(&store)
        .stored_identity(me.clone())
        .connect()
        .await;

    assert_eq!(restarted.client.session().current_identity(), Some(me.clone()));
    assert!(!restarted.client.session().is_loading());
    assert_eq!(restarted.client.directory().identity(), Some(me));
    let state = wait_for_directory(&restarted, |s| !s.loading).await;
    assert_eq!(state.active_circle_id, Some(circle.id));
}

#[tokio::test]
async fn test_sign_in_is_persisted_and_stable() {
    let test = common::test_client().await;
    let name = fake_name();

    let first = test.client.sign_in(Some(format!("  {}  ", name))).await;
    let second = test.client.sign_in(Some("Someone else".into())).await;

    assert_eq!(first, second);
    assert_eq!(first.display_name.as_deref(), Some(name.trim()));
    assert_eq!(test.session_storage.stored(), Some(first));
}

#[tokio::test]
async fn test_file_session_survives_restart() {
    let path = std::env::temp_dir()
        .join(format!("circlelink-{}", Uuid::new_v4()))
        .join("session.json");
    let store = InMemoryDocumentStore::new();
    let config = Config::default();
    let connect = || {
        CircleClient::connect(
            &config,
            Collaborators {
                store: Arc::new(store.clone()),
                session_storage: Arc::new(FileSessionStorage::new(&path)),
                positioning: Arc::new(SimulatedPositioningSensor::default()),
                battery: Arc::new(SimulatedBatterySensor::default()),
                alerts: Arc::new(MockAlertBroadcaster::new()),
            },
        )
    };

    let client = connect().await;
    let signed_in = client.sign_in(Some("Alice".into())).await;
    drop(client);

    let client = connect().await;
    assert_eq!(client.session().current_identity(), Some(signed_in));

    client.sign_out().await;
    drop(client);
    let client = connect().await;
    assert_eq!(client.session().current_identity(), None);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[tokio::test]
async fn test_tracking_publishes_location_and_battery() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    let circle = create_active_circle(&alice, "Family").await;

    alice.client.start_tracking().await.unwrap();
    assert!(alice.client.is_tracking());
    assert_eq!(alice.positioning.watcher_count(), 1);
    let options = alice.positioning.last_options().unwrap();
    assert_eq!(options.time_interval_ms, 5_000);

    alice.positioning.push_fix(35.6762, 139.6503);
    let state = wait_for_directory(&alice, |s| {
        s.active_circle()
            .and_then(|c| c.members[0].location)
            .is_some()
    })
    .await;
    let member = &state.active_circle().unwrap().members[0];
    assert_eq!(
        member.location.unwrap().coordinates(),
        Coordinates::new(35.6762, 139.6503)
    );

    alice.battery.set_state(BatteryState::Charging);
    alice.battery.set_level(0.42);
    let state = wait_for_directory(&alice, |s| {
        s.active_circle()
            .and_then(|c| c.members[0].battery)
            .map_or(false, |b| b.level == 42 && b.is_charging)
    })
    .await;
    assert_eq!(state.circles.len(), 1);

    assert!(alice.client.stop_tracking());
    assert!(!alice.client.is_tracking());
    assert_eq!(alice.positioning.watcher_count(), 0);
    assert_eq!(alice.battery.listener_count(), 0);
    assert!(!alice.client.stop_tracking());

    // Fixes after stopping are not published.
    alice.positioning.push_fix(1.0, 1.0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stored = stored_circle(&store, &circle.id).await;
    assert_eq!(
        stored.members[0].location.unwrap().coordinates(),
        Coordinates::new(35.6762, 139.6503)
    );
}

#[tokio::test]
async fn test_tracking_requests_permission_once() {
    let store = InMemoryDocumentStore::new();
    let alice = TestClientBuilder::new()
        .store(&store)
        .positioning(undetermined_positioning(true))
        .connect()
        .await;
    alice.client.sign_in(None).await;
    assert!(!alice.client.geolocation().has_permission());

    alice.client.start_tracking().await.unwrap();
    alice.client.start_tracking().await.unwrap();

    assert!(alice.client.geolocation().has_permission());
    assert_eq!(alice.positioning.watcher_count(), 1);
    assert_eq!(
        alice.positioning.background_permission(),
        PermissionStatus::Granted
    );
}

#[tokio::test]
async fn test_denied_permission_posts_notice() {
    let store = InMemoryDocumentStore::new();
    let alice = TestClientBuilder::new()
        .store(&store)
        .positioning(SimulatedPositioningSensor::denied())
        .connect()
        .await;
    alice.client.sign_in(None).await;
    let mut notices = alice.client.notices().subscribe();

    let result = alice.client.start_tracking().await;

    assert!(matches!(result, Err(CircleError::SensorPermissionDenied(_))));
    assert!(!alice.client.is_tracking());
    assert_eq!(alice.positioning.watcher_count(), 0);
    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.title, "Location Permission Required");
}

#[tokio::test]
async fn test_unavailable_sensor_fails_tracking() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    alice.positioning.set_unavailable(Some("location services off"));

    let result = alice.client.start_tracking().await;

    assert!(matches!(result, Err(CircleError::SensorUnavailable(_))));
    assert!(!alice.client.is_tracking());
}

#[tokio::test]
async fn test_session_loading_flag_observed() {
    let test = common::test_client().await;
    let state = wait_for(test.client.session().subscribe(), |s| !s.loading).await;
    assert_eq!(state.identity, None);
}
