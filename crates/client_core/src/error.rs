use shared::error::DeviceFault;
use thiserror::Error;

/// Failures of a single gateway exchange.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error(transparent)]
    Device(#[from] DeviceFault),
}

#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not connected to a device")]
    NotConnected,
    #[error("camera is not open")]
    CameraNotOpen,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error("device error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Device { code: Option<i64>, message: String },
    #[error("failed to load album: {0}")]
    CatalogLoad(Box<ControllerError>),
    /// A newer connect, disconnect or page load replaced this one while it
    /// was in flight; its result was discarded.
    #[error("request superseded by a newer one")]
    Superseded,
}

impl ControllerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for failures raised locally before any request left the process.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotConnected | Self::CameraNotOpen
        )
    }

    pub fn device_code(&self) -> Option<i64> {
        match self {
            Self::Device { code, .. } => *code,
            Self::CatalogLoad(inner) => inner.device_code(),
            _ => None,
        }
    }
}

impl From<GatewayError> for ControllerError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Network(message) => Self::Network(message),
            GatewayError::Protocol(message) => Self::Protocol(message),
            GatewayError::Device(fault) => Self::Device {
                code: fault.code,
                message: fault.message,
            },
        }
    }
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;
