//! Command requests for the external control tool.

use std::time::Duration;

use crate::device::DeviceSerial;
use crate::screen::Point;

/// Timeout for general commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for one screen snapshot.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for one character of text input.
pub const TEXT_CHAR_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the native resolution query.
pub const RESOLUTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Android key codes used by the fleet actions.
pub mod keycode {
    pub const HOME: u32 = 3;
    pub const BACK: u32 = 4;
    pub const POWER: u32 = 26;
    pub const ENTER: u32 = 66;
    pub const VOLUME_MUTE: u32 = 164;
    pub const RECENTS: u32 = 187;

    /// Human-readable name for status lines.
    #[must_use]
    pub fn name(code: u32) -> &'static str {
        match code {
            HOME => "HOME",
            BACK => "BACK",
            POWER => "POWER",
            ENTER => "ENTER",
            VOLUME_MUTE => "MUTE",
            RECENTS => "RECENTS",
            24 => "VOL UP",
            25 => "VOL DOWN",
            _ => "KEY EVENT",
        }
    }
}

/// One invocation of the control tool.
///
/// `serial` is `None` for tool-global verbs such as `devices`. Immutable once
/// handed to a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub serial: Option<DeviceSerial>,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandRequest {
    /// A device-scoped command with the default timeout.
    pub fn new<I, S>(serial: DeviceSerial, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            serial: Some(serial),
            args: args.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A command not bound to any device.
    pub fn global<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            serial: None,
            args: args.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `shell <args...>`
    pub fn shell<I, S>(serial: DeviceSerial, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full = vec!["shell".to_string()];
        full.extend(args.into_iter().map(Into::into));
        Self::new(serial, full)
    }

    pub fn key_event(serial: DeviceSerial, code: u32) -> Self {
        Self::shell(serial, ["input".to_string(), "keyevent".to_string(), code.to_string()])
    }

    pub fn tap(serial: DeviceSerial, at: Point) -> Self {
        Self::shell(
            serial,
            [
                "input".to_string(),
                "tap".to_string(),
                at.x.to_string(),
                at.y.to_string(),
            ],
        )
    }

    /// `shell input swipe x1 y1 x2 y2 ms`. A zero-distance swipe is a long-press.
    pub fn swipe(serial: DeviceSerial, from: Point, to: Point, duration: Duration) -> Self {
        Self::shell(
            serial,
            [
                "input".to_string(),
                "swipe".to_string(),
                from.x.to_string(),
                from.y.to_string(),
                to.x.to_string(),
                to.y.to_string(),
                duration.as_millis().to_string(),
            ],
        )
    }

    /// A single character of text input. Spaces need the `%s` escape.
    pub fn text_char(serial: DeviceSerial, c: char) -> Self {
        let encoded = if c == ' ' {
            "%s".to_string()
        } else {
            c.to_string()
        };
        Self::shell(serial, ["input".to_string(), "text".to_string(), encoded])
            .with_timeout(TEXT_CHAR_TIMEOUT)
    }

    /// Binary PNG snapshot of the screen on stdout.
    pub fn screencap(serial: DeviceSerial) -> Self {
        Self::new(serial, ["exec-out", "screencap", "-p"]).with_timeout(SNAPSHOT_TIMEOUT)
    }

    /// Native resolution query (`shell wm size`).
    pub fn screen_size(serial: DeviceSerial) -> Self {
        Self::shell(serial, ["wm", "size"]).with_timeout(RESOLUTION_TIMEOUT)
    }

    /// `settings put <namespace> <key> <value>`
    pub fn settings_put(serial: DeviceSerial, namespace: &str, key: &str, value: &str) -> Self {
        Self::shell(serial, ["settings", "put", namespace, key, value])
    }

    /// Install (or reinstall, `-r`) an APK.
    pub fn install(serial: DeviceSerial, apk: &str) -> Self {
        Self::new(serial, ["install", "-r", apk])
    }

    pub fn reboot(serial: DeviceSerial) -> Self {
        Self::new(serial, ["reboot"])
    }

    pub fn power_off(serial: DeviceSerial) -> Self {
        Self::shell(serial, ["reboot", "-p"])
    }

    /// Full argument vector handed to the tool, including `-s <serial>`.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if let Some(serial) = &self.serial {
            argv.push("-s".to_string());
            argv.push(serial.to_string());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl std::fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}
