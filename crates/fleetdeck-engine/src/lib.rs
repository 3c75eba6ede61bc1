//! Fleet engine for fleetdeck.
//!
//! Owns the active device set, the bounded command dispatcher, the
//! screen-capture pipeline and gesture mirroring, and exposes the fleet
//! actions front ends call.

pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod mirror;
pub mod report;
pub mod setup;
pub mod state;

pub use capture::{CaptureStream, DisplaySurface, DisplayedFrame, MemorySurface};
pub use config::Config;
pub use dispatcher::{Dispatcher, Job, Step};
pub use engine::{Engine, PoolSendReport};
pub use error::EngineError;
pub use mirror::ScrollDirection;
pub use report::BatchReport;
pub use state::{CaptureState, EngineStatus};
