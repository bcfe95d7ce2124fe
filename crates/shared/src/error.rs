use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application codes reported by the device in the `code` field of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorCode {
    Success,
    AlreadyOpenOrBusy,
    HardwareFailure,
    Timeout,
    InvalidParameters,
    Unsupported,
    DeviceBusy,
    Unknown,
}

impl DeviceErrorCode {
    pub const ALREADY_OPEN_OR_BUSY: i64 = 374;

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Success,
            374 => Self::AlreadyOpenOrBusy,
            375 => Self::HardwareFailure,
            376 => Self::Timeout,
            377 => Self::InvalidParameters,
            378 => Self::Unsupported,
            379 => Self::DeviceBusy,
            _ => Self::Unknown,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AlreadyOpenOrBusy => "camera already open or busy",
            Self::HardwareFailure => "camera hardware failure",
            Self::Timeout => "timeout",
            Self::InvalidParameters => "invalid parameters",
            Self::Unsupported => "not supported",
            Self::DeviceBusy => "device busy",
            Self::Unknown => "unknown error",
        }
    }
}

/// A non-success answer from the device or from the proxy in front of it.
///
/// `code` is the application code when the payload carried one, the HTTP
/// status for transport-level rejections, and `None` for status strings such
/// as `"no_response"`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("device error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
pub struct DeviceFault {
    pub code: Option<i64>,
    pub message: String,
}

impl DeviceFault {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds a fault for an application code, falling back to the code's
    /// fixed description when the payload had no message.
    pub fn from_code(code: i64, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DeviceErrorCode::from_code(code).description().to_string());
        Self::new(Some(code), message)
    }

    pub fn kind(&self) -> Option<DeviceErrorCode> {
        self.code.map(DeviceErrorCode::from_code)
    }

    pub fn is_already_open_or_busy(&self) -> bool {
        self.code == Some(DeviceErrorCode::ALREADY_OPEN_OR_BUSY)
    }
}
