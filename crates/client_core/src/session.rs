use serde::Serialize;
use shared::domain::{CameraState, ConnectionState, DeviceInfo};

use crate::error::{ControllerError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub device_address: Option<String>,
    pub camera: CameraState,
    pub device: Option<DeviceInfo>,
}

/// Identifies one `connect` attempt. Stale tickets are ignored when their
/// response finally arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTicket(u64);

/// What a command needs from the session before it may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Connected,
    CameraOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundDevice {
    pub address: String,
    epoch: u64,
}

#[derive(Debug, Default)]
pub struct SessionState {
    connection: ConnectionState,
    address: Option<String>,
    camera: CameraState,
    device: Option<DeviceInfo>,
    epoch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection,
            device_address: self.address.clone(),
            camera: self.camera,
            device: self.device.clone(),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn camera(&self) -> CameraState {
        self.camera
    }

    /// Validates the address and moves to `Connecting`. Any earlier attempt
    /// still in flight is superseded.
    pub fn begin_connect(&mut self, address: &str) -> Result<(ConnectTicket, String)> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ControllerError::validation("device address must not be empty"));
        }

        self.epoch += 1;
        self.connection = ConnectionState::Connecting;
        self.address = None;
        self.camera = CameraState::Closed;
        self.device = None;
        Ok((ConnectTicket(self.epoch), address.to_string()))
    }

    /// Returns `false` when the ticket was superseded and nothing changed.
    pub fn complete_connect(
        &mut self,
        ticket: ConnectTicket,
        address: String,
        device: DeviceInfo,
    ) -> bool {
        if ticket.0 != self.epoch || self.connection != ConnectionState::Connecting {
            return false;
        }
        self.connection = ConnectionState::Connected;
        self.address = Some(address);
        self.device = Some(device);
        true
    }

    pub fn fail_connect(&mut self, ticket: ConnectTicket) -> bool {
        if ticket.0 != self.epoch || self.connection != ConnectionState::Connecting {
            return false;
        }
        self.connection = ConnectionState::Error;
        self.address = None;
        self.camera = CameraState::Closed;
        self.device = None;
        true
    }

    /// Drops the binding locally. Also invalidates a pending connect.
    pub fn disconnect(&mut self) {
        self.epoch += 1;
        self.connection = ConnectionState::Disconnected;
        self.address = None;
        self.camera = CameraState::Closed;
        self.device = None;
    }

    /// The guard: refuses before any network traffic unless the session
    /// satisfies `requirement`.
    pub fn require(&self, requirement: Requirement) -> Result<BoundDevice> {
        let address = match (&self.connection, &self.address) {
            (ConnectionState::Connected, Some(address)) => address.clone(),
            _ => return Err(ControllerError::NotConnected),
        };
        if requirement == Requirement::CameraOpen && self.camera != CameraState::Open {
            return Err(ControllerError::CameraNotOpen);
        }
        Ok(BoundDevice {
            address,
            epoch: self.epoch,
        })
    }

    /// Records a confirmed camera transition. Ignored when the session moved
    /// on (disconnect or reconnect) while the request was in flight.
    pub fn set_camera(&mut self, bound: &BoundDevice, camera: CameraState) -> bool {
        if bound.epoch != self.epoch || self.connection != ConnectionState::Connected {
            return false;
        }
        self.camera = camera;
        true
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
