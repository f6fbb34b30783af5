//! Alert broadcasting for SOS alerts.
//!
//! Provides the abstraction the SOS flow uses to reach the other members of
//! a circle. Delivery itself is owned by an external push channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::models::LocationStamp;

/// Alert type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Sos,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Sos => write!(f, "sos"),
        }
    }
}

/// Payload broadcast to every member of the active circle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosAlertPayload {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub alert_id: Uuid,
    pub circle_id: String,
    pub circle_name: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    /// Latest known location of the sender, if any fix was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationStamp>,
    pub timestamp: DateTime<Utc>,
}

/// Result of an alert broadcast attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertResult {
    /// Alert was handed to the delivery channel.
    Sent,
    /// Broadcasting failed (the SOS flow still completes).
    Failed(String),
}

/// Alert broadcaster trait for sending emergency alerts to a circle.
#[async_trait::async_trait]
pub trait AlertBroadcaster: Send + Sync {
    /// Broadcast an SOS alert to all members of the payload's circle.
    async fn broadcast_sos(&self, payload: SosAlertPayload) -> AlertResult;
}

/// Mock alert broadcaster for development and testing.
///
/// Logs alerts and records them but doesn't deliver anything.
#[derive(Debug, Clone, Default)]
pub struct MockAlertBroadcaster {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    sent: Arc<Mutex<Vec<SosAlertPayload>>>,
}

impl MockAlertBroadcaster {
    /// Create a new mock alert broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock broadcaster that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Alerts received so far, oldest first.
    pub fn sent(&self) -> Vec<SosAlertPayload> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl AlertBroadcaster for MockAlertBroadcaster {
    async fn broadcast_sos(&self, payload: SosAlertPayload) -> AlertResult {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());

        if self.simulate_failure {
            tracing::warn!(
                alert_id = %payload.alert_id,
                circle_id = %payload.circle_id,
                "Mock alert broadcaster simulating failure"
            );
            return AlertResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            alert_id = %payload.alert_id,
            circle_id = %payload.circle_id,
            circle_name = %payload.circle_name,
            sender_id = %payload.sender_id,
            has_location = payload.location.is_some(),
            "Mock: Would broadcast SOS alert"
        );

        AlertResult::Sent
    }
}
