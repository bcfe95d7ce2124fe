use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    #[default]
    Closed,
    Open,
}

/// Album media categories as numbered by the device. Unknown numbers are kept
/// verbatim so newer firmware categories still round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MediaType {
    #[default]
    All,
    Photo,
    Video,
    Burst,
    Astro,
    Panorama,
    Other(i64),
}

impl MediaType {
    pub fn code(self) -> i64 {
        match self {
            Self::All => 0,
            Self::Photo => 1,
            Self::Video => 2,
            Self::Burst => 3,
            Self::Astro => 4,
            Self::Panorama => 5,
            Self::Other(code) => code,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Photo => "photos",
            Self::Video => "videos",
            Self::Burst => "bursts",
            Self::Astro => "astro",
            Self::Panorama => "panorama",
            Self::Other(_) => "other",
        }
    }
}

impl From<i64> for MediaType {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::All,
            1 => Self::Photo,
            2 => Self::Video,
            3 => Self::Burst,
            4 => Self::Astro,
            5 => Self::Panorama,
            other => Self::Other(other),
        }
    }
}

impl From<MediaType> for i64 {
    fn from(value: MediaType) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub media_type: MediaType,
    /// Unix seconds, when the device reports one.
    pub timestamp: Option<i64>,
}

impl MediaItem {
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCount {
    pub media_type: MediaType,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
}

/// Motor direction derived from one joystick sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlVector {
    /// Degrees in `[0, 360)`, measured with `atan2(y, x)`.
    pub angle: f64,
    /// Deflection in `[0, 1]`.
    pub magnitude: f64,
    pub speed: f64,
}

impl ControlVector {
    /// Builds the vector for a pointer offset `(x, y)` from the center of a
    /// control surface whose usable radius is `max_distance`.
    pub fn from_offset(x: f64, y: f64, max_distance: f64, speed: f64) -> Self {
        let distance = (x * x + y * y).sqrt();
        let angle = (y.atan2(x).to_degrees() + 360.0) % 360.0;
        let magnitude = if max_distance > 0.0 {
            (distance.min(max_distance) / max_distance).min(1.0)
        } else {
            0.0
        };

        Self {
            angle,
            magnitude,
            speed,
        }
    }

    pub fn full_deflection(angle: f64, speed: f64) -> Self {
        Self {
            angle: (angle % 360.0 + 360.0) % 360.0,
            magnitude: 1.0,
            speed,
        }
    }
}
