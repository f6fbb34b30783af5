//! Battery status models.

use serde::{Deserialize, Serialize};
use shared::validation::validate_battery_level;
use validator::ValidationError;

/// Charging state as reported by the device battery sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    #[default]
    Unknown,
    Unplugged,
    Charging,
    Full,
}

impl BatteryState {
    /// Only an active charge counts as charging; a full battery does not.
    pub fn is_charging(&self) -> bool {
        matches!(self, BatteryState::Charging)
    }
}

/// How worrying a battery level is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryBand {
    /// Below 15%.
    Critical,
    /// Below 30%.
    Low,
    Normal,
}

/// Battery snapshot stored on a member (percentage 0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatterySnapshot {
    pub level: u8,
    pub is_charging: bool,
}

impl BatterySnapshot {
    /// Creates a snapshot from a percentage, rejecting values outside 0-100.
    pub fn new(level: i32, is_charging: bool) -> Result<Self, ValidationError> {
        validate_battery_level(level)?;
        Ok(Self {
            level: level as u8,
            is_charging,
        })
    }

    /// Builds a snapshot from the sensor's 0.0-1.0 level fraction.
    ///
    /// NaN and infinite readings are rejected rather than cast.
    pub fn from_sensor(fraction: f32, state: BatteryState) -> Result<Self, ValidationError> {
        if !fraction.is_finite() {
            let mut err = ValidationError::new("battery_reading");
            err.message = Some("Battery reading is not a number".into());
            return Err(err);
        }
        Self::new((fraction * 100.0).round() as i32, state.is_charging())
    }

    pub fn band(&self) -> BatteryBand {
        match self.level {
            0..=14 => BatteryBand::Critical,
            15..=29 => BatteryBand::Low,
            _ => BatteryBand::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_snapshot_bounds() {
        assert!(BatterySnapshot::new(0, false).is_ok());
        assert!(BatterySnapshot::new(100, true).is_ok());
        assert!(BatterySnapshot::new(101, false).is_err());
        assert!(BatterySnapshot::new(-1, false).is_err());
    }

    #[test]
    fn test_from_sensor_rounds_fraction() {
        let snapshot = BatterySnapshot::from_sensor(0.876, BatteryState::Charging).unwrap();
        assert_eq!(snapshot.level, 88);
        assert!(snapshot.is_charging);

        let full = BatterySnapshot::from_sensor(1.0, BatteryState::Full).unwrap();
        assert_eq!(full.level, 100);
        assert!(!full.is_charging);
    }

    #[test]
    fn test_from_sensor_rejects_non_finite_readings() {
        for reading in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = BatterySnapshot::from_sensor(reading, BatteryState::Unplugged).unwrap_err();
            assert_eq!(err.code, "battery_reading");
        }
    }

    #[test]
    fn test_band_thresholds() {
        let band = |level| BatterySnapshot::new(level, false).unwrap().band();
        assert_eq!(band(0), BatteryBand::Critical);
        assert_eq!(band(14), BatteryBand::Critical);
        assert_eq!(band(15), BatteryBand::Low);
        assert_eq!(band(29), BatteryBand::Low);
        assert_eq!(band(30), BatteryBand::Normal);
        assert_eq!(band(100), BatteryBand::Normal);
    }

    #[test]
    fn test_wire_format() {
        let snapshot = BatterySnapshot::new(42, true).unwrap();
        assert_eq!(
            serde_json::to_value(snapshot).unwrap(),
            serde_json::json!({"level": 42, "isCharging": true})
        );
    }
}
