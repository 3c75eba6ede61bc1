//! Engine errors.

use fleetdeck_types::{DeviceSerial, Point};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no devices connected")]
    NoDevices,

    #[error("no device selected for mirroring")]
    NoDeviceSelected,

    #[error("device {0} is not in the active set")]
    UnknownDevice(DeviceSerial),

    #[error("no pool named {0:?} in the configuration")]
    UnknownPool(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("capture is already running")]
    AlreadyCapturing,

    #[error("no frame has been displayed yet")]
    NoFrame,

    /// The point lands in the letterbox padding or off the surface.
    #[error("point {0} is outside the displayed image")]
    OutOfBounds(Point),

    #[error("could not resolve screen size of {serial}: {reason}")]
    DeviceUnresolvable { serial: DeviceSerial, reason: String },

    #[error("runner error: {0}")]
    Runner(#[from] fleetdeck_runner::RunnerError),

    #[error("pool error: {0}")]
    Pool(#[from] fleetdeck_pool::PoolError),

    #[error("discovery error: {0}")]
    Discovery(#[from] fleetdeck_discovery::DiscoveryError),

    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
