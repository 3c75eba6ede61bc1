//! Capture and engine status types.

use fleetdeck_types::DeviceSerial;

/// State of the screen-capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    /// Producer and consumer are running.
    Capturing,
}

impl CaptureState {
    /// Whether a new capture may start.
    pub fn can_start(self) -> bool {
        self == Self::Idle
    }

    pub fn is_capturing(self) -> bool {
        self == Self::Capturing
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Capturing => write!(f, "Capturing"),
        }
    }
}

/// Snapshot published to front ends on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub devices: usize,
    /// Device being mirrored and used for resolution queries.
    pub selected: Option<DeviceSerial>,
    /// Last one-line status message.
    pub message: String,
}
