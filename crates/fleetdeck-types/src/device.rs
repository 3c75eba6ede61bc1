//! Device descriptor types.

use serde::{Deserialize, Serialize};

/// Serial string the control tool uses to address one device (`-s <serial>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSerial(String);

impl DeviceSerial {
    #[must_use]
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceSerial {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceSerial {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DeviceSerial {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection state column of the discovery table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// Online and accepting commands.
    Device,
    Offline,
    /// Debugging not yet authorized on the device.
    Unauthorized,
    /// Any state this crate does not model (`recovery`, `sideload`, ...).
    Other(String),
}

impl DeviceState {
    /// Parse the state column as printed by the control tool.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "device" => Self::Device,
            "offline" => Self::Offline,
            "unauthorized" => Self::Unauthorized,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Offline => write!(f, "offline"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One device as reported by the last discovery refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub serial: DeviceSerial,
    pub state: DeviceState,
}

impl DeviceSession {
    /// Whether the device belongs in the active set.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == DeviceState::Device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_serializes_as_plain_string() {
        let serial = DeviceSerial::from("emulator-5554");
        let json = serde_json::to_string(&serial).unwrap();
        assert_eq!(json, "\"emulator-5554\"");
        let back: DeviceSerial = serde_json::from_str(&json).unwrap();
        assert_eq!(back, serial);
    }

    #[test]
    fn state_parse_known_and_unknown() {
        assert_eq!(DeviceState::parse("device"), DeviceState::Device);
        assert_eq!(DeviceState::parse(" offline "), DeviceState::Offline);
        assert_eq!(DeviceState::parse("unauthorized"), DeviceState::Unauthorized);
        assert_eq!(
            DeviceState::parse("recovery"),
            DeviceState::Other("recovery".to_string())
        );
    }

    #[test]
    fn only_device_state_is_connected() {
        let online = DeviceSession {
            serial: "a".into(),
            state: DeviceState::Device,
        };
        let offline = DeviceSession {
            serial: "b".into(),
            state: DeviceState::Offline,
        };
        assert!(online.is_connected());
        assert!(!offline.is_connected());
    }
}
