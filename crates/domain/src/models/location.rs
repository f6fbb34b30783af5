//! Location domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::validation::{validate_accuracy, validate_latitude, validate_longitude};
use validator::{Validate, ValidationErrors};

/// A latitude/longitude pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Stamps these coordinates with the given capture time.
    pub fn stamped(self, timestamp: DateTime<Utc>) -> LocationStamp {
        LocationStamp {
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp,
        }
    }
}

impl Validate for Coordinates {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_latitude(self.latitude) {
            errors.add("latitude", e);
        }
        if let Err(e) = validate_longitude(self.longitude) {
            errors.add("longitude", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A member's last known location as stored in the circle document.
///
/// The timestamp travels as epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStamp {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl LocationStamp {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Accuracy tier requested from the positioning sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationAccuracy {
    Lowest,
    Low,
    Balanced,
    #[default]
    High,
    Highest,
    BestForNavigation,
}

impl LocationAccuracy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationAccuracy::Lowest => "lowest",
            LocationAccuracy::Low => "low",
            LocationAccuracy::Balanced => "balanced",
            LocationAccuracy::High => "high",
            LocationAccuracy::Highest => "highest",
            LocationAccuracy::BestForNavigation => "best_for_navigation",
        }
    }
}

impl std::fmt::Display for LocationAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timestamped fix delivered by the positioning sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub coords: Coordinates,
    /// Horizontal accuracy radius in meters, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(coords: Coordinates, captured_at: DateTime<Utc>) -> Self {
        Self {
            coords,
            accuracy: None,
            altitude: None,
            captured_at,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

impl Validate for PositionSample {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.coords.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if let Some(accuracy) = self.accuracy {
            if let Err(e) = validate_accuracy(accuracy) {
                errors.add("accuracy", e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(52.52, 13.405).validate().is_ok());
        assert!(Coordinates::new(-90.0, 180.0).validate().is_ok());

        let errors = Coordinates::new(91.0, 181.0).validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("latitude"));
        assert!(fields.contains_key("longitude"));
    }

    #[test]
    fn test_location_stamp_wire_format() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let stamp = Coordinates::new(1.5, -2.5).stamped(ts);
        let json = serde_json::to_value(stamp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"latitude": 1.5, "longitude": -2.5, "timestamp": 1_700_000_000_123i64})
        );

        let back: LocationStamp = serde_json::from_value(json).unwrap();
        assert_eq!(back, stamp);
        assert_eq!(back.coordinates(), Coordinates::new(1.5, -2.5));
    }

    #[test]
    fn test_accuracy_names() {
        assert_eq!(LocationAccuracy::default(), LocationAccuracy::High);
        assert_eq!(
            LocationAccuracy::BestForNavigation.to_string(),
            "best_for_navigation"
        );
        let parsed: LocationAccuracy = serde_json::from_str("\"balanced\"").unwrap();
        assert_eq!(parsed, LocationAccuracy::Balanced);
    }

    #[test]
    fn test_position_sample_validation() {
        let sample = PositionSample::new(Coordinates::new(10.0, 10.0), Utc::now());
        assert!(sample.validate().is_ok());
        assert!(sample.with_accuracy(5.0).validate().is_ok());

        let errors = sample.with_accuracy(-3.0).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("accuracy"));
    }
}
