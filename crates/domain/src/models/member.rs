//! Member model: an identity's presence record within one circle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::battery::BatterySnapshot;
use super::identity::Identity;
use super::location::LocationStamp;

/// A member entry inside a circle document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatterySnapshot>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

impl Member {
    /// Name of the field members are keyed by inside a circle document.
    pub const KEY_FIELD: &'static str = "id";

    /// A bare member entry with no presence data yet.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: None,
            battery: None,
            last_seen: None,
            is_online: None,
        }
    }

    /// Projects an identity into a fresh member entry.
    pub fn from_identity(identity: &Identity, fallback_name: &str) -> Self {
        Self::new(identity.id, identity.member_name(fallback_name))
    }

    /// A missing flag counts as offline.
    pub fn online(&self) -> bool {
        self.is_online.unwrap_or(false)
    }
}

/// Relative "last seen" label: `Just now`, `12m ago`, `3h ago`, `2d ago`,
/// or `Unknown` when never seen.
///
/// Timestamps ahead of `now` read as `Just now`.
pub fn format_last_seen(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last_seen) = last_seen else {
        return "Unknown".to_string();
    };
    let minutes = (now - last_seen).num_minutes();
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    format!("{}d ago", hours / 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::location::Coordinates;
    use chrono::TimeZone;

    #[test]
    fn test_new_member_serializes_minimal_entry() {
        let member = Member::new(Uuid::nil(), "Ana");
        assert_eq!(
            serde_json::to_value(&member).unwrap(),
            serde_json::json!({"id": Uuid::nil(), "name": "Ana"})
        );
    }

    #[test]
    fn test_full_member_round_trip() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut member = Member::new(Uuid::new_v4(), "Ben");
        member.location = Some(Coordinates::new(40.0, -3.7).stamped(ts));
        member.battery = Some(BatterySnapshot::new(55, false).unwrap());
        member.last_seen = Some(ts);
        member.is_online = Some(true);

        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json["lastSeen"], 1_700_000_000_000i64);
        assert_eq!(json["isOnline"], true);

        let back: Member = serde_json::from_value(json).unwrap();
        assert_eq!(back, member);
    }

    #[test]
    fn test_format_last_seen_buckets() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let ago = |secs: i64| Some(now - chrono::Duration::seconds(secs));

        assert_eq!(format_last_seen(None, now), "Unknown");
        assert_eq!(format_last_seen(ago(0), now), "Just now");
        assert_eq!(format_last_seen(ago(59), now), "Just now");
        assert_eq!(format_last_seen(ago(60), now), "1m ago");
        assert_eq!(format_last_seen(ago(59 * 60 + 59), now), "59m ago");
        assert_eq!(format_last_seen(ago(60 * 60), now), "1h ago");
        assert_eq!(format_last_seen(ago(23 * 3600 + 3599), now), "23h ago");
        assert_eq!(format_last_seen(ago(24 * 3600), now), "1d ago");
        assert_eq!(format_last_seen(ago(10 * 86_400), now), "10d ago");
    }

    #[test]
    fn test_format_last_seen_future_is_just_now() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let ahead = now + chrono::Duration::minutes(5);
        assert_eq!(format_last_seen(Some(ahead), now), "Just now");
    }

    #[test]
    fn test_online_defaults_to_false() {
        let mut member = Member::new(Uuid::nil(), "Ana");
        assert!(!member.online());
        member.is_online = Some(true);
        assert!(member.online());
    }

    #[test]
    fn test_from_identity_applies_fallback_name() {
        let identity = Identity::generate(None);
        let member = Member::from_identity(&identity, "Anonymous");
        assert_eq!(member.id, identity.id);
        assert_eq!(member.name, "Anonymous");
    }
}
