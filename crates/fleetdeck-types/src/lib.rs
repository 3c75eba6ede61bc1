//! Shared types for fleetdeck.
//!
//! This crate contains all types shared across the fleetdeck workspace:
//! device serials and sessions, command requests, screen geometry and
//! letterboxing, pointer gestures, data pool kinds, and batch identity.

pub mod batch;
pub mod command;
pub mod device;
pub mod gesture;
pub mod pool;
pub mod screen;

pub use batch::BatchId;
pub use command::{keycode, CommandRequest};
pub use device::{DeviceSerial, DeviceSession, DeviceState};
pub use gesture::{Gesture, GestureEvent, GestureKind, GestureThresholds};
pub use pool::PoolKind;
pub use screen::{Letterbox, ParseSizeError, Point, Size};
