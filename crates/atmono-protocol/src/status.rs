//! Controller software status.

use crate::error::{ProtocolError, ProtocolResult};

/// Lifecycle status reported by `?SWST`.
///
/// The discriminants are the ordinals sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Controller is initializing or resetting.
    SettingUp = 0,
    /// Controller accepts state-changing commands.
    Ready = 1,
    /// No client connected / controller not running.
    Offline = 2,
    /// Controller hit an internal error.
    Fault = 3,
}

impl DeviceStatus {
    /// Wire ordinal of this status.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Map a wire ordinal back to a status.
    pub fn from_code(code: i64) -> ProtocolResult<DeviceStatus> {
        match code {
            0 => Ok(DeviceStatus::SettingUp),
            1 => Ok(DeviceStatus::Ready),
            2 => Ok(DeviceStatus::Offline),
            3 => Ok(DeviceStatus::Fault),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }

    /// Whether the controller can no longer make progress on its own.
    pub fn is_fatal(self) -> bool {
        matches!(self, DeviceStatus::Fault | DeviceStatus::Offline)
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::SettingUp => write!(f, "SETTING_UP"),
            DeviceStatus::Ready => write!(f, "READY"),
            DeviceStatus::Offline => write!(f, "OFFLINE"),
            DeviceStatus::Fault => write!(f, "FAULT"),
        }
    }
}
