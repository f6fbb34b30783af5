//! SOS alert session state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds counted down before an SOS alert is sent.
pub const SOS_COUNTDOWN_SECS: u32 = 10;

/// State of the local SOS flow.
///
/// `Sent` is transient: the controller moves back to `Idle` right after
/// dispatching the alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "remaining", rename_all = "snake_case")]
pub enum SosState {
    #[default]
    Idle,
    Confirming,
    Counting(u32),
    Sent,
}

impl SosState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SosState::Idle => "idle",
            SosState::Confirming => "confirming",
            SosState::Counting(_) => "counting",
            SosState::Sent => "sent",
        }
    }

    pub fn is_counting(&self) -> bool {
        matches!(self, SosState::Counting(_))
    }

    /// Seconds left on the countdown, if one is running.
    pub fn remaining(&self) -> Option<u32> {
        match self {
            SosState::Counting(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for SosState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SosState::Counting(n) => write!(f, "counting({})", n),
            other => f.write_str(other.as_str()),
        }
    }
}
