//! Seat state data structures.
//!
//! Contains the decoded seat reading and the JSON records exchanged with
//! the collector backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Seat position reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatState {
    /// Seat back upright.
    Normal,
    /// Seat back reclined.
    Reclined,
}

impl SeatState {
    /// Create from raw byte value.
    ///
    /// Only `1` means upright; every other value reads as reclined.
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Normal,
            _ => Self::Reclined,
        }
    }

    /// Decode a notification payload from its first byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeError`] for an empty payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        payload
            .first()
            .copied()
            .map(Self::from_raw)
            .ok_or_else(|| Error::DecodeError {
                context: "empty seat state payload".to_string(),
            })
    }

    /// Name as used on the wire and in status text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Reclined => "Reclined",
        }
    }
}

impl std::fmt::Display for SeatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single decoded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatReading {
    /// Decoded seat state.
    pub state: SeatState,
    /// When the notification was received.
    pub received_at: DateTime<Utc>,
}

impl SeatReading {
    /// Create a reading stamped with the current time.
    pub fn new(state: SeatState) -> Self {
        Self {
            state,
            received_at: Utc::now(),
        }
    }

    /// Decode a payload into a reading stamped now.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        SeatState::decode(payload).map(Self::new)
    }

    /// Text shown on the presentation surface.
    pub fn status_text(&self) -> String {
        format!("Seat State: {}", self.state)
    }
}

/// Request and response body for the seat-state endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatStateRecord {
    /// The recorded state.
    pub state: SeatState,
}

impl From<SeatState> for SeatStateRecord {
    fn from(state: SeatState) -> Self {
        Self { state }
    }
}

/// Successful response from the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Server message.
    pub message: String,
}
