//! Integration tests for the SOS confirmation, countdown and dispatch flow.
//!
//! These run on a paused clock so the ten-second countdown is driven by
//! virtual time.

mod common;

use common::{create_active_circle, identity, signed_in_client, wait_for, TestClientBuilder};
use domain::errors::CircleError;
use domain::models::{Coordinates, SosState, SOS_COUNTDOWN_SECS};
use domain::services::alert::AlertType;
use persistence::store::InMemoryDocumentStore;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

fn drain(rx: &mut broadcast::Receiver<circlelink_app::services::UserNotice>) -> Vec<String> {
    let mut titles = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        titles.push(notice.title);
    }
    titles
}

#[tokio::test(start_paused = true)]
async fn test_countdown_dispatches_exactly_once() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    let circle = create_active_circle(&alice, "Family").await;
    let mut notices = alice.client.notices().subscribe();
    let sos = alice.client.sos();

    assert_eq!(sos.request(), Ok(SosState::Confirming));
    assert_eq!(sos.confirm(), Ok(SosState::Counting(SOS_COUNTDOWN_SECS)));

    sleep(Duration::from_millis(4_500)).await;
    assert_eq!(sos.state(), SosState::Counting(6));
    assert!(alice.alerts.sent().is_empty());

    sleep(Duration::from_millis(5_600)).await;
    let sent = alice.alerts.sent();
    assert_eq!(sent.len(), 1);
    let alert = &sent[0];
    assert_eq!(alert.alert_type, AlertType::Sos);
    assert_eq!(alert.circle_id, circle.id);
    assert_eq!(alert.circle_name, "Family");
    assert_eq!(alert.sender_id, identity(&alice).id);
    assert_eq!(alert.location, None);
    assert_eq!(sos.state(), SosState::Idle);
    assert_eq!(drain(&mut notices), vec!["SOS Alert Sent".to_string()]);

    // Nothing else fires later.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(alice.alerts.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_alert_carries_latest_location() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    create_active_circle(&alice, "Family").await;

    alice.client.start_tracking().await.unwrap();
    alice.positioning.push_fix(51.5074, -0.1278);
    wait_for(alice.client.geolocation().subscribe(), |s| s.is_some()).await;

    let sos = alice.client.sos();
    sos.request().unwrap();
    sos.confirm().unwrap();
    sleep(Duration::from_secs(11)).await;

    let sent = alice.alerts.sent();
    assert_eq!(sent.len(), 1);
    let location = sent[0].location.expect("alert location");
    assert_eq!(location.coordinates(), Coordinates::new(51.5074, -0.1278));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_zero_suppresses_dispatch() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    create_active_circle(&alice, "Family").await;
    let sos = alice.client.sos();

    sos.request().unwrap();
    sos.confirm().unwrap();
    sleep(Duration::from_millis(9_500)).await;
    assert_eq!(sos.state(), SosState::Counting(1));

    assert!(sos.cancel());
    assert_eq!(sos.state(), SosState::Idle);

    sleep(Duration::from_secs(5)).await;
    assert!(alice.alerts.sent().is_empty());
    assert_eq!(sos.state(), SosState::Idle);
    assert!(!sos.cancel());
}

#[tokio::test(start_paused = true)]
async fn test_sos_without_active_circle_stays_idle() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    common::wait_for_directory(&alice, |s| !s.loading).await;
    let mut notices = alice.client.notices().subscribe();

    let result = alice.client.sos().request();

    assert_eq!(result, Err(CircleError::NoActiveContext));
    assert_eq!(alice.client.sos().state(), SosState::Idle);
    assert_eq!(drain(&mut notices), vec!["No Safety Circle".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_second_request_is_rejected_while_active() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    create_active_circle(&alice, "Family").await;
    let sos = alice.client.sos();

    sos.request().unwrap();
    assert_eq!(sos.request(), Err(CircleError::AlertAlreadyActive));
    assert_eq!(sos.state(), SosState::Confirming);

    sos.confirm().unwrap();
    assert_eq!(sos.request(), Err(CircleError::AlertAlreadyActive));
    assert!(matches!(
        sos.confirm(),
        Err(CircleError::InvalidTransition { action: "confirm", .. })
    ));

    sleep(Duration::from_secs(11)).await;
    assert_eq!(alice.alerts.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_decline_returns_to_idle() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    create_active_circle(&alice, "Family").await;
    let sos = alice.client.sos();

    assert!(matches!(
        sos.decline(),
        Err(CircleError::InvalidTransition { action: "decline", .. })
    ));
    sos.request().unwrap();
    assert_eq!(sos.decline(), Ok(SosState::Idle));

    sleep(Duration::from_secs(11)).await;
    assert!(alice.alerts.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_failure_returns_to_idle() {
    let store = InMemoryDocumentStore::new();
    let alice = TestClientBuilder::new()
        .store(&store)
        .failing_alerts()
        .connect()
        .await;
    alice.client.sign_in(None).await;
    create_active_circle(&alice, "Family").await;
    let mut notices = alice.client.notices().subscribe();
    let sos = alice.client.sos();

    sos.request().unwrap();
    sos.confirm().unwrap();
    sleep(Duration::from_secs(11)).await;

    assert_eq!(alice.alerts.sent().len(), 1);
    assert_eq!(sos.state(), SosState::Idle);
    assert_eq!(drain(&mut notices), vec!["SOS Alert Failed".to_string()]);

    // A new alert can be started afterwards.
    assert_eq!(sos.request(), Ok(SosState::Confirming));
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_cancels_countdown() {
    let store = InMemoryDocumentStore::new();
    let alice = signed_in_client(&store).await;
    create_active_circle(&alice, "Family").await;

    alice.client.sos().request().unwrap();
    alice.client.sos().confirm().unwrap();
    sleep(Duration::from_secs(3)).await;
    alice.client.sign_out().await;

    sleep(Duration::from_secs(10)).await;
    assert!(alice.alerts.sent().is_empty());
    assert_eq!(alice.client.sos().state(), SosState::Idle);
}
