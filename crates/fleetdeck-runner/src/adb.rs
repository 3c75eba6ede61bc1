//! Process backend that shells out to the control tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_types::CommandRequest;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::CommandRunner;

/// How often a running child is checked against its deadline and token.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs requests as `<program> [-s <serial>] <args...>`.
#[derive(Debug, Clone)]
pub struct AdbRunner {
    program: PathBuf,
    poll_interval: Duration,
}

impl Default for AdbRunner {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl AdbRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn(&self, request: &CommandRequest) -> Result<Child, RunnerError> {
        Command::new(&self.program)
            .args(request.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RunnerError::ToolNotFound(self.program.display().to_string())
                } else {
                    RunnerError::Spawn(e)
                }
            })
    }
}

#[async_trait]
impl CommandRunner for AdbRunner {
    async fn run(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RunnerError> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        debug!(command = %request, "running");

        let mut child = self.spawn(request)?;
        let mut stdout = drain(child.stdout.take());
        let mut stderr = drain(child.stderr.take());

        let deadline = Instant::now() + request.timeout;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // A descendant of the child can keep the pipes open after the child
        // exits, so the drains race the deadline and token too.
        let finished = {
            let collect = async {
                let status = child.wait().await?;
                let out = join(&mut stdout).await?;
                let err = join(&mut stderr).await?;
                Ok::<_, RunnerError>((status, out, err))
            };
            tokio::pin!(collect);
            loop {
                tokio::select! {
                    result = &mut collect => break Ok(result),
                    _ = ticker.tick() => {
                        if cancel.is_cancelled() {
                            break Err(RunnerError::Cancelled);
                        }
                        if Instant::now() >= deadline {
                            break Err(RunnerError::Timeout(request.timeout));
                        }
                    }
                }
            }
        };
        let (status, stdout, stderr) = match finished {
            Ok(result) => result?,
            Err(stop) => {
                kill(&mut child, &stdout, &stderr).await;
                if stop.is_timeout() {
                    warn!(command = %request, timeout = ?request.timeout, "timed out");
                } else {
                    debug!(command = %request, "cancelled");
                }
                return Err(stop);
            }
        };

        if status.success() {
            return Ok(stdout);
        }

        let diagnostic = {
            let err = String::from_utf8_lossy(&stderr);
            if err.trim().is_empty() {
                String::from_utf8_lossy(&stdout).trim().to_string()
            } else {
                err.trim().to_string()
            }
        };
        debug!(command = %request, code = ?status.code(), %diagnostic, "failed");
        Err(RunnerError::ProcessFailure {
            code: status.code(),
            diagnostic,
        })
    }
}

/// Read a pipe to the end on its own task so a chatty child cannot block on
/// a full pipe while we wait for it.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!(error = %e, "pipe read failed");
            }
        }
        buf
    })
}

async fn join(reader: &mut JoinHandle<Vec<u8>>) -> Result<Vec<u8>, RunnerError> {
    reader
        .await
        .map_err(|e| RunnerError::Other(anyhow::anyhow!("pipe reader failed: {e}")))
}

async fn kill(child: &mut Child, stdout: &JoinHandle<Vec<u8>>, stderr: &JoinHandle<Vec<u8>>) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed");
    }
    let _ = child.wait().await;
    stdout.abort();
    stderr.abort();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandRequest {
        CommandRequest::global(["-c", script])
    }

    fn runner() -> AdbRunner {
        AdbRunner::new("sh").with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let out = runner()
            .run(&sh("printf 'List of devices attached\\n'"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, b"List of devices attached\n");
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() {
        let err = runner()
            .run(&sh("echo 'error: device offline' >&2; exit 1"), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            RunnerError::ProcessFailure { code, diagnostic } => {
                assert_eq!(code, Some(1));
                assert_eq!(diagnostic, "error: device offline");
            }
            other => panic!("expected ProcessFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_stderr_falls_back_to_stdout() {
        let err = runner()
            .run(&sh("echo 'Failure [INSTALL_FAILED]'; exit 1"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failure [INSTALL_FAILED]"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let request = sh("sleep 5").with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = runner()
            .run(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let err = runner().run(&sh("sleep 5"), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn pipe_held_by_background_process_still_times_out() {
        let request = sh("sleep 3 & echo hi").with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = runner()
            .run(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn pipe_held_by_background_process_still_cancels() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let err = runner()
            .run(&sh("sleep 3 & echo hi"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled(), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn already_cancelled_never_spawns() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = AdbRunner::new("/nonexistent/tool")
            .run(&sh("true"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let err = AdbRunner::new("/nonexistent/fleetdeck-test-tool")
            .run(&CommandRequest::global(["devices"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ToolNotFound(ref p) if p.contains("fleetdeck-test-tool")));
    }
}
