//! Discovery subsystem errors.

use fleetdeck_runner::RunnerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The control tool is not installed or not on `PATH`.
    #[error("control tool not found: {0}")]
    ToolNotFound(String),

    #[error("device listing failed: {0}")]
    Listing(RunnerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<RunnerError> for DiscoveryError {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::ToolNotFound(program) => Self::ToolNotFound(program),
            other => Self::Listing(other),
        }
    }
}
