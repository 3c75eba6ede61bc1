//! Cancellable invocation of the external device-control tool.
//!
//! This crate defines the [`CommandRunner`] trait that process backends must
//! implement, the [`CancellationSignal`] shared by every dispatched task, and
//! the character-at-a-time [`send_text`] helper. [`AdbRunner`] is the real
//! backend; the `mock` feature adds a scriptable backend for tests.

use async_trait::async_trait;
use fleetdeck_types::{CommandRequest, DeviceSerial};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod adb;
pub mod cancel;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use adb::AdbRunner;
pub use cancel::CancellationSignal;
pub use error::RunnerError;

/// Runs one command against the control tool.
///
/// Implementations launch exactly one child per call and never retry. They
/// must return [`RunnerError::Cancelled`] (not a failure) once `cancel` fires,
/// [`RunnerError::Timeout`] once `request.timeout` elapses, and
/// [`RunnerError::ToolNotFound`] when the tool is missing.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Run `request`, returning captured stdout on exit status 0.
    async fn run(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RunnerError>;
}

/// Outcome of one submission. Never partially filled.
#[derive(Debug)]
pub struct CommandResult {
    pub serial: Option<DeviceSerial>,
    pub outcome: Result<Vec<u8>, RunnerError>,
}

impl CommandResult {
    pub fn new(serial: Option<DeviceSerial>, outcome: Result<Vec<u8>, RunnerError>) -> Self {
        Self { serial, outcome }
    }

    pub fn cancelled(serial: Option<DeviceSerial>) -> Self {
        Self::new(serial, Err(RunnerError::Cancelled))
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.outcome, Err(e) if e.is_cancelled())
    }

    /// Captured stdout as lossy UTF-8, empty on failure.
    pub fn stdout_text(&self) -> String {
        match &self.outcome {
            Ok(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Err(_) => String::new(),
        }
    }

    pub fn error(&self) -> Option<&RunnerError> {
        self.outcome.as_ref().err()
    }
}

/// Type `text` into the focused field, one character per invocation.
///
/// Each character is its own `input text` call. The first failing character
/// ends the loop and nothing is retried. Returns the number of characters
/// sent.
pub async fn send_text(
    runner: &dyn CommandRunner,
    serial: &DeviceSerial,
    text: &str,
    cancel: &CancellationToken,
) -> Result<usize, RunnerError> {
    let mut sent = 0;
    for c in text.chars() {
        if cancel.is_cancelled() {
            debug!(serial = %serial, sent, "text input cancelled");
            return Err(RunnerError::Cancelled);
        }
        let request = CommandRequest::text_char(serial.clone(), c);
        runner.run(&request, cancel).await?;
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::mock::{MockReply, MockRunner};
    use super::*;

    #[tokio::test]
    async fn send_text_one_call_per_char_with_space_escape() {
        let runner = MockRunner::new();
        let handle = runner.handle();
        let cancel = CancellationToken::new();

        let sent = send_text(&runner, &"dev1".into(), "a b", &cancel)
            .await
            .unwrap();
        assert_eq!(sent, 3);

        let calls = handle.calls();
        let typed: Vec<&str> = calls.iter().map(|c| c.args[3].as_str()).collect();
        assert_eq!(typed, ["a", "%s", "b"]);
    }

    #[tokio::test]
    async fn send_text_stops_at_first_failure() {
        let runner = MockRunner::new();
        runner.on(
            &["shell", "input", "text", "b"],
            MockReply::failure(1, "error: closed"),
        );
        let handle = runner.handle();
        let cancel = CancellationToken::new();

        let err = send_text(&runner, &"dev1".into(), "abc", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ProcessFailure { .. }));
        // 'c' never sent, 'b' not retried.
        assert_eq!(handle.call_count(), 2);
    }

    #[tokio::test]
    async fn send_text_honors_cancellation() {
        let runner = MockRunner::new();
        let handle = runner.handle();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = send_text(&runner, &"dev1".into(), "abc", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(handle.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_text_sends_nothing() {
        let runner = MockRunner::new();
        let handle = runner.handle();
        let sent = send_text(&runner, &"dev1".into(), "", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sent, 0);
        assert_eq!(handle.call_count(), 0);
    }

    #[test]
    fn result_accessors() {
        let ok = CommandResult::new(Some("a".into()), Ok(b"hello\n".to_vec()));
        assert!(ok.is_success());
        assert_eq!(ok.stdout_text(), "hello\n");
        assert!(ok.error().is_none());

        let cancelled = CommandResult::cancelled(Some("a".into()));
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_success());
        assert_eq!(cancelled.stdout_text(), "");
    }
}
