//! Device discovery for fleetdeck.
//!
//! Runs the control tool's `devices` verb and parses its table into
//! [`DeviceSession`]s. Only rows in the `device` state form the active set;
//! offline and unauthorized devices are reported but never addressed.

use fleetdeck_runner::CommandRunner;
use fleetdeck_types::{CommandRequest, DeviceSerial, DeviceSession, DeviceState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod error;

pub use error::DiscoveryError;

/// Parse the output of `devices`.
///
/// The first line is a header (`List of devices attached`). Each remaining
/// non-blank row is `serial<TAB>state`, optionally followed by descriptor
/// columns. Daemon start-up chatter (`* daemon ... *`) is skipped.
pub fn parse_device_table(output: &str) -> Vec<DeviceSession> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*'))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let serial = cols.next()?;
            let state = cols.next()?;
            Some(DeviceSession {
                serial: DeviceSerial::new(serial),
                state: DeviceState::parse(state),
            })
        })
        .collect()
}

/// List every device the tool reports, connected or not.
pub async fn list_devices(
    runner: &dyn CommandRunner,
    cancel: &CancellationToken,
) -> Result<Vec<DeviceSession>, DiscoveryError> {
    let stdout = runner
        .run(&CommandRequest::global(["devices"]), cancel)
        .await?;
    let sessions = parse_device_table(&String::from_utf8_lossy(&stdout));
    for s in sessions.iter().filter(|s| !s.is_connected()) {
        debug!(serial = %s.serial, state = %s.state, "ignoring device");
    }
    Ok(sessions)
}

/// The active set: serials of connected devices, in table order.
pub async fn discover(
    runner: &dyn CommandRunner,
    cancel: &CancellationToken,
) -> Result<Vec<DeviceSerial>, DiscoveryError> {
    let active: Vec<DeviceSerial> = list_devices(runner, cancel)
        .await?
        .into_iter()
        .filter(DeviceSession::is_connected)
        .map(|s| s.serial)
        .collect();
    info!(count = active.len(), "discovered devices");
    Ok(active)
}

#[cfg(test)]
mod tests {
    use fleetdeck_runner::mock::{MockReply, MockRunner};

    use super::*;

    const TABLE: &str = "List of devices attached\n\
                         emulator-5554\tdevice\n\
                         R58M12ABCDE\tunauthorized\n\
                         192.168.1.20:5555\tdevice\n\
                         0123456789\toffline\n\n";

    #[test]
    fn parses_rows_after_header() {
        let sessions = parse_device_table(TABLE);
        assert_eq!(sessions.len(), 4);
        assert_eq!(sessions[0].serial.as_str(), "emulator-5554");
        assert_eq!(sessions[1].state, DeviceState::Unauthorized);
        assert_eq!(sessions[3].state, DeviceState::Offline);
    }

    #[test]
    fn empty_table_has_no_devices() {
        assert!(parse_device_table("List of devices attached\n\n").is_empty());
        assert!(parse_device_table("").is_empty());
    }

    #[test]
    fn skips_daemon_chatter_and_extra_columns() {
        let out = "* daemon not running; starting now at tcp:5037\n\
                   * daemon started successfully\n\
                   List of devices attached\n\
                   abc123  device usb:1-1 product:x model:Pixel_7\n";
        let sessions = parse_device_table(out);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].serial.as_str(), "abc123");
        assert!(sessions[0].is_connected());
    }

    #[tokio::test]
    async fn discover_keeps_connected_devices_in_order() {
        let runner = MockRunner::new();
        runner.on(&["devices"], MockReply::stdout(TABLE));

        let active = discover(&runner, &CancellationToken::new()).await.unwrap();
        let serials: Vec<&str> = active.iter().map(DeviceSerial::as_str).collect();
        assert_eq!(serials, ["emulator-5554", "192.168.1.20:5555"]);

        let calls = runner.handle().calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].serial.is_none());
    }

    #[tokio::test]
    async fn missing_tool_is_distinct() {
        let runner = MockRunner::new();
        runner.on(&["devices"], MockReply::ToolNotFound);
        let err = discover(&runner, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn other_failures_are_listing_errors() {
        let runner = MockRunner::new();
        runner.on(&["devices"], MockReply::failure(1, "cannot connect to daemon"));
        let err = discover(&runner, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Listing(_)));
        assert!(err.to_string().contains("cannot connect to daemon"));
    }
}
