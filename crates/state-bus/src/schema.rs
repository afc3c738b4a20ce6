//! # Message Schema
//!
//! The closed set of payload types carried on the bus. A registry entry's
//! `type` tag resolves to a [`MessageType`] once, at load time; payloads
//! travel as the tagged [`Message`] enum.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type tag of a channel's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Navigation settings and route progress.
    Settings,
    /// Filtered position and orientation estimate.
    LiveLocation,
}

impl MessageType {
    /// All known tags, in declaration order.
    pub const ALL: [MessageType; 2] = [MessageType::Settings, MessageType::LiveLocation];

    /// The tag as written in registry files.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Settings => "Settings",
            MessageType::LiveLocation => "LiveLocation",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// A single turn along the active route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Maneuver {
    pub distance: f64,
    pub kind: String,
    pub modifier: String,
}

/// Navigation state published by the routing service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Publisher's monotonic clock, milliseconds.
    pub timestamp: u64,
    pub search_input: i64,
    pub upcoming_turn: String,
    pub current_speed_limit: f64,
    pub banner_instructions: String,
    pub distance_to_next_turn: f64,
    pub distance_to_end_of_step: f64,
    pub route_progress_percent: f64,
    pub distance_from_route: f64,
    pub route_position_cumulative: f64,
    pub total_distance_remaining: f64,
    pub total_time_remaining: f64,
    pub all_maneuvers: Vec<Maneuver>,
}

/// An estimate with per-axis standard deviation and a validity flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    pub value: Vec<f64>,
    pub std: Vec<f64>,
    pub valid: bool,
}

/// Localizer output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveLocation {
    pub timestamp: u64,
    /// Latitude, longitude (degrees).
    pub position_geodetic: Measurement,
    /// Roll, pitch, yaw (radians).
    pub calibrated_orientation_ned: Measurement,
}

/// A payload of any registered type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Settings(Settings),
    LiveLocation(LiveLocation),
}

impl Message {
    /// The type tag of this payload.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Settings(_) => MessageType::Settings,
            Message::LiveLocation(_) => MessageType::LiveLocation,
        }
    }

    #[must_use]
    pub fn as_settings(&self) -> Option<&Settings> {
        match self {
            Message::Settings(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_live_location(&self) -> Option<&LiveLocation> {
        match self {
            Message::LiveLocation(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Settings> for Message {
    fn from(value: Settings) -> Self {
        Message::Settings(value)
    }
}

impl From<LiveLocation> for Message {
    fn from(value: LiveLocation) -> Self {
        Message::LiveLocation(value)
    }
}
