//! Field validators for presence data and user input.
//!
//! Each returns a [`ValidationError`] whose code names the rule and whose
//! message is the text shown to the user.

use std::ops::RangeInclusive;
use validator::ValidationError;

fn rejected(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// NaN and infinities fall outside every range.
fn within(value: f64, range: RangeInclusive<f64>) -> bool {
    value.is_finite() && range.contains(&value)
}

/// WGS84 latitude in degrees.
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    within(lat, -90.0..=90.0)
        .then_some(())
        .ok_or_else(|| rejected("latitude_range", "Latitude must be between -90 and 90"))
}

/// WGS84 longitude in degrees.
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    within(lon, -180.0..=180.0)
        .then_some(())
        .ok_or_else(|| rejected("longitude_range", "Longitude must be between -180 and 180"))
}

/// Horizontal accuracy radius in meters.
pub fn validate_accuracy(accuracy: f64) -> Result<(), ValidationError> {
    within(accuracy, 0.0..=f64::MAX)
        .then_some(())
        .ok_or_else(|| rejected("accuracy_range", "Accuracy must be non-negative"))
}

/// Battery percentage.
pub fn validate_battery_level(level: i32) -> Result<(), ValidationError> {
    (0..=100)
        .contains(&level)
        .then_some(())
        .ok_or_else(|| rejected("battery_range", "Battery level must be between 0 and 100"))
}

/// At least one non-whitespace character.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    match value.trim().is_empty() {
        true => Err(rejected("blank", "Value cannot be blank")),
        false => Ok(()),
    }
}

/// Renders a validation error as its message, falling back to its code.
pub fn describe(err: &ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}
