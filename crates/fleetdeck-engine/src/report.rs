//! Summaries of dispatched batches.

use fleetdeck_runner::CommandResult;
use fleetdeck_types::BatchId;

/// Per-device outcomes of one fleet action.
#[derive(Debug)]
pub struct BatchReport {
    pub batch: BatchId,
    /// Short action label used in the status line (`HOME`, `REBOOT`, ...).
    pub action: String,
    pub results: Vec<CommandResult>,
}

impl BatchReport {
    pub fn new(batch: BatchId, action: impl Into<String>, results: Vec<CommandResult>) -> Self {
        Self {
            batch,
            action: action.into(),
            results,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.results.iter().filter(|r| r.is_cancelled()).count()
    }

    /// Failures other than cancellation.
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded() - self.cancelled()
    }

    pub fn is_success(&self) -> bool {
        self.succeeded() == self.total()
    }

    /// One-line summary for status displays.
    pub fn status_line(&self) -> String {
        let total = self.total();
        let (failed, cancelled) = (self.failed(), self.cancelled());
        if failed > 0 {
            format!("{} failed on {failed} of {total} devices", self.action)
        } else if cancelled > 0 {
            format!("{} cancelled on {cancelled} of {total} devices", self.action)
        } else if total == 1 {
            format!("{} sent to 1 device", self.action)
        } else {
            format!("{} sent to {total} devices", self.action)
        }
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.status_line())?;
        for result in &self.results {
            let serial = result
                .serial
                .as_ref()
                .map_or("-", fleetdeck_types::DeviceSerial::as_str);
            match &result.outcome {
                Ok(_) => writeln!(f, "  {serial}: ok")?,
                Err(e) => writeln!(f, "  {serial}: {e}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fleetdeck_runner::RunnerError;

    use super::*;

    fn ok(serial: &str) -> CommandResult {
        CommandResult::new(Some(serial.into()), Ok(Vec::new()))
    }

    fn failed(serial: &str) -> CommandResult {
        CommandResult::new(
            Some(serial.into()),
            Err(RunnerError::ProcessFailure {
                code: Some(1),
                diagnostic: "offline".into(),
            }),
        )
    }

    #[test]
    fn all_ok() {
        let report = BatchReport::new(BatchId::new(), "HOME", vec![ok("a"), ok("b")]);
        assert!(report.is_success());
        assert_eq!(report.status_line(), "HOME sent to 2 devices");
    }

    #[test]
    fn counts_failures_apart_from_cancellations() {
        let report = BatchReport::new(
            BatchId::new(),
            "REBOOT",
            vec![
                ok("a"),
                failed("b"),
                CommandResult::cancelled(Some("c".into())),
            ],
        );
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cancelled(), 1);
        assert_eq!(report.status_line(), "REBOOT failed on 1 of 3 devices");
    }

    #[test]
    fn cancelled_only() {
        let report = BatchReport::new(
            BatchId::new(),
            "INSTALL",
            vec![CommandResult::cancelled(Some("a".into()))],
        );
        assert_eq!(report.status_line(), "INSTALL cancelled on 1 of 1 devices");
    }

    #[test]
    fn display_lists_devices() {
        let report = BatchReport::new(BatchId::new(), "TAP", vec![ok("a"), failed("b")]);
        let text = report.to_string();
        assert!(text.contains("  a: ok"));
        assert!(text.contains("  b: command failed (exit 1): offline"));
    }
}
