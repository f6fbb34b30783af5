//! Presence publisher: writes the signed-in member's location and battery
//! into the active circle document.
//!
//! Each write also stamps the member's `lastSeen` with the write time and
//! marks it online.
//!
//! Every write re-reads the circle first. In [`WriteMode::KeyedMerge`] the
//! member's entry is then patched in place with the store's keyed merge, so
//! concurrent writers touching other members never collide. In
//! [`WriteMode::FullRewrite`] the whole member list is written back, and a
//! concurrent write to another member that lands between the read and the
//! write is lost.

use chrono::{DateTime, Utc};
use domain::errors::{CircleError, CircleResult};
use domain::models::{BatterySnapshot, Circle, Coordinates, Identity, LocationStamp, Member};
use metrics::counter;
use persistence::repositories::CircleRepository;
use persistence::store::FieldMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::config::WriteMode;
use crate::services::directory::CircleDirectory;
use crate::services::session::SessionManager;

const LOCATION_FIELD: &str = "location";
const BATTERY_FIELD: &str = "battery";
const LAST_SEEN_FIELD: &str = "lastSeen";
const IS_ONLINE_FIELD: &str = "isOnline";

pub struct PresencePublisher {
    repository: CircleRepository,
    session: Arc<SessionManager>,
    directory: Arc<CircleDirectory>,
    write_mode: WriteMode,
}

impl PresencePublisher {
    pub fn new(
        repository: CircleRepository,
        session: Arc<SessionManager>,
        directory: Arc<CircleDirectory>,
        write_mode: WriteMode,
    ) -> Self {
        Self {
            repository,
            session,
            directory,
            write_mode,
        }
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    fn context(&self) -> CircleResult<(Identity, Circle)> {
        match (self.session.current_identity(), self.directory.active_circle()) {
            (Some(identity), Some(circle)) => Ok((identity, circle)),
            _ => Err(CircleError::NoActiveContext),
        }
    }

    /// Record `coords`, stamped with the current time, as the caller's
    /// location in the active circle.
    pub async fn update_member_location(&self, coords: Coordinates) -> CircleResult<LocationStamp> {
        let (identity, circle) = self.context()?;
        coords.validate()?;

        let now = Utc::now();
        let stamp = coords.stamped(now);
        let value = serde_json::to_value(stamp).map_err(malformed)?;
        let patch = presence_patch(LOCATION_FIELD, value, now);
        self.write_patch(&identity, &circle.id, patch).await?;

        self.record_update(LOCATION_FIELD);
        debug!(circle_id = %circle.id, user_id = %identity.id, "Location published");
        Ok(stamp)
    }

    /// Record `battery` as the caller's battery snapshot in the active circle.
    pub async fn update_member_battery(&self, battery: BatterySnapshot) -> CircleResult<()> {
        let (identity, circle) = self.context()?;

        let value = serde_json::to_value(battery).map_err(malformed)?;
        let patch = presence_patch(BATTERY_FIELD, value, Utc::now());
        self.write_patch(&identity, &circle.id, patch).await?;

        self.record_update(BATTERY_FIELD);
        debug!(
            circle_id = %circle.id,
            user_id = %identity.id,
            level = battery.level,
            charging = battery.is_charging,
            "Battery published"
        );
        Ok(())
    }

    fn record_update(&self, kind: &'static str) {
        counter!(
            "presence_updates_total",
            "kind" => kind,
            "mode" => self.write_mode.as_str()
        )
        .increment(1);
    }

    async fn write_patch(
        &self,
        identity: &Identity,
        circle_id: &str,
        patch: FieldMap,
    ) -> CircleResult<()> {
        let mut entries = self
            .repository
            .fetch_member_entries(circle_id)
            .await?
            .ok_or_else(|| CircleError::CircleNotFound(circle_id.to_string()))?;

        let member_key = Value::String(identity.id.to_string());
        let index = entries
            .iter()
            .position(|entry| entry.get(Member::KEY_FIELD) == Some(&member_key))
            .ok_or_else(|| CircleError::NotAMember(circle_id.to_string()))?;

        match self.write_mode {
            WriteMode::KeyedMerge => {
                self.repository
                    .merge_member_fields(circle_id, identity.id, patch)
                    .await?;
            }
            WriteMode::FullRewrite => {
                let entry = entries[index]
                    .as_object_mut()
                    .ok_or_else(|| CircleError::NotAMember(circle_id.to_string()))?;
                entry.extend(patch);
                let entries_len = entries.len();
                self.repository.overwrite_members(circle_id, entries).await?;
                debug!(circle_id = %circle_id, members = entries_len, "Member list rewritten");
            }
        }
        Ok(())
    }
}

/// `field: value` plus the last-seen stamp and online flag.
fn presence_patch(field: &str, value: Value, now: DateTime<Utc>) -> FieldMap {
    let mut patch = FieldMap::new();
    patch.insert(field.to_string(), value);
    patch.insert(LAST_SEEN_FIELD.to_string(), Value::from(now.timestamp_millis()));
    patch.insert(IS_ONLINE_FIELD.to_string(), Value::Bool(true));
    patch
}

fn malformed(e: serde_json::Error) -> CircleError {
    CircleError::StoreUnavailable(format!("Failed to encode presence update: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_malformed_maps_to_store_error() {
        let err = serde_json::from_str::<Value>("{").unwrap_err();
        assert!(matches!(malformed(err), CircleError::StoreUnavailable(msg) if msg.contains("encode")));
    }

    #[test]
    fn test_field_names_match_member_wire_format() {
        let member = serde_json::to_value(Member {
            location: Some(Coordinates::new(1.0, 2.0).stamped(Utc::now())),
            battery: Some(BatterySnapshot::new(50, false).unwrap()),
            ..Member::new(uuid::Uuid::nil(), "Ana")
        })
        .unwrap();
        assert!(member.get(LOCATION_FIELD).is_some());
        assert!(member.get(BATTERY_FIELD).is_some());
    }

    #[test]
    fn test_presence_patch_stamps_last_seen() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let battery = serde_json::to_value(BatterySnapshot::new(5, false).unwrap()).unwrap();
        let patch = presence_patch(BATTERY_FIELD, battery, now);

        let mut entry = serde_json::to_value(Member::new(uuid::Uuid::nil(), "Ana")).unwrap();
        if let Some(fields) = entry.as_object_mut() {
            fields.extend(patch);
        }
        let member: Member = serde_json::from_value(entry).unwrap();
        assert_eq!(member.last_seen, Some(now));
        assert_eq!(member.is_online, Some(true));
    }
}
