//! Engine configuration loaded from TOML.

use std::path::PathBuf;
use std::time::Duration;

use fleetdeck_types::{GestureThresholds, PoolKind};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl Config {
    /// Look up a named pool definition.
    pub fn pool(&self, name: &str) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| p.name == name)
    }
}

/// Worker pool and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Workers per available CPU.
    #[serde(default = "default_workers_per_core")]
    pub workers_per_core: usize,
    /// Pause between typing a pool value and pressing ENTER.
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workers_per_core: default_workers_per_core(),
            confirm_delay_ms: default_confirm_delay_ms(),
        }
    }
}

impl EngineConfig {
    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }
}

/// The external control tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_short_timeout_secs")]
    pub resolution_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            poll_interval_ms: default_poll_interval_ms(),
            command_timeout_secs: default_command_timeout_secs(),
            resolution_timeout_secs: default_short_timeout_secs(),
        }
    }
}

impl ToolConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_secs(self.resolution_timeout_secs)
    }
}

/// Screen mirroring cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Producer sleep between snapshots.
    #[serde(default = "default_capture_interval_ms")]
    pub interval_ms: u64,
    /// Consumer tick.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_short_timeout_secs")]
    pub snapshot_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_capture_interval_ms(),
            tick_ms: default_tick_ms(),
            snapshot_timeout_secs: default_short_timeout_secs(),
        }
    }
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_secs)
    }
}

/// Gesture classification and replay timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureConfig {
    #[serde(default = "default_drag_threshold")]
    pub drag_threshold: f64,
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
    /// How long a replayed long-press holds the point.
    #[serde(default = "default_long_press_hold_ms")]
    pub long_press_hold_ms: u64,
    #[serde(default = "default_swipe_ms")]
    pub swipe_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            drag_threshold: default_drag_threshold(),
            long_press_ms: default_long_press_ms(),
            long_press_hold_ms: default_long_press_hold_ms(),
            swipe_ms: default_swipe_ms(),
        }
    }
}

impl GestureConfig {
    pub fn thresholds(&self) -> GestureThresholds {
        GestureThresholds {
            drag_threshold: self.drag_threshold,
            long_press: Duration::from_millis(self.long_press_ms),
        }
    }

    pub fn long_press_hold(&self) -> Duration {
        Duration::from_millis(self.long_press_hold_ms)
    }

    pub fn swipe(&self) -> Duration {
        Duration::from_millis(self.swipe_ms)
    }
}

/// A named data pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub kind: PoolKind,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers_per_core() -> usize {
    4
}

fn default_confirm_delay_ms() -> u64 {
    500
}

fn default_program() -> PathBuf {
    PathBuf::from("adb")
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_command_timeout_secs() -> u64 {
    60
}

fn default_short_timeout_secs() -> u64 {
    5
}

fn default_capture_interval_ms() -> u64 {
    50
}

fn default_tick_ms() -> u64 {
    100
}

fn default_drag_threshold() -> f64 {
    20.0
}

fn default_long_press_ms() -> u64 {
    500
}

fn default_long_press_hold_ms() -> u64 {
    1000
}

fn default_swipe_ms() -> u64 {
    300
}
