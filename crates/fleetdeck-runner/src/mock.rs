//! Mock runner for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_types::{CommandRequest, DeviceSerial};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::CommandRunner;

/// Scripted reply for a matching request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Stdout(Vec<u8>),
    Failure { code: i32, diagnostic: String },
    Timeout,
    ToolNotFound,
    /// Wait on the tokio clock, then reply. Honors the token and the
    /// request's timeout while waiting.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::Stdout(text.into().into_bytes())
    }

    pub fn failure(code: i32, diagnostic: impl Into<String>) -> Self {
        Self::Failure {
            code,
            diagnostic: diagnostic.into(),
        }
    }

    #[must_use]
    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

#[derive(Debug)]
struct Rule {
    serial: Option<DeviceSerial>,
    prefix: Vec<String>,
    replies: VecDeque<MockReply>,
}

impl Rule {
    fn matches(&self, request: &CommandRequest) -> bool {
        if let Some(serial) = &self.serial {
            if request.serial.as_ref() != Some(serial) {
                return false;
            }
        }
        request.args.starts_with(&self.prefix)
    }

    /// Replies are consumed in order; the last one repeats.
    fn next_reply(&mut self) -> MockReply {
        if self.replies.len() > 1 {
            if let Some(reply) = self.replies.pop_front() {
                return reply;
            }
        }
        self.replies
            .front()
            .cloned()
            .unwrap_or(MockReply::Stdout(Vec::new()))
    }
}

#[derive(Debug, Default)]
struct MockRunnerState {
    rules: Vec<Rule>,
    calls: Vec<CommandRequest>,
}

/// Mock runner backend for testing.
///
/// Requests are matched against rules by optional serial and argument
/// prefix. The most recently added matching rule wins; unmatched requests
/// succeed with empty stdout.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockRunnerState>>,
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to any device whose args start with `prefix`.
    pub fn on(&self, prefix: &[&str], reply: MockReply) -> &Self {
        self.add(None, prefix, vec![reply])
    }

    /// Reply to `serial` only.
    pub fn on_device(&self, serial: &str, prefix: &[&str], reply: MockReply) -> &Self {
        self.add(Some(serial.into()), prefix, vec![reply])
    }

    /// Reply with each of `replies` in turn, repeating the last.
    pub fn on_sequence(
        &self,
        serial: Option<&str>,
        prefix: &[&str],
        replies: Vec<MockReply>,
    ) -> &Self {
        self.add(serial.map(DeviceSerial::from), prefix, replies)
    }

    fn add(&self, serial: Option<DeviceSerial>, prefix: &[&str], replies: Vec<MockReply>) -> &Self {
        self.state.lock().unwrap().rules.push(Rule {
            serial,
            prefix: prefix.iter().map(|s| (*s).to_string()).collect(),
            replies: replies.into(),
        });
        self
    }

    /// Get a clonable handle for observing calls from tests.
    pub fn handle(&self) -> MockRunnerHandle {
        MockRunnerHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn reply_for(&self, request: &CommandRequest) -> MockReply {
        let mut state = self.state.lock().unwrap();
        state.calls.push(request.clone());
        state
            .rules
            .iter_mut()
            .rev()
            .find(|r| r.matches(request))
            .map_or(MockReply::Stdout(Vec::new()), Rule::next_reply)
    }
}

/// Clonable observer handle for `MockRunner`.
#[derive(Debug, Clone)]
pub struct MockRunnerHandle {
    state: Arc<Mutex<MockRunnerState>>,
}

impl MockRunnerHandle {
    /// Snapshot of every request that reached the runner, in arrival order.
    pub fn calls(&self) -> Vec<CommandRequest> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Requests addressed to `serial`.
    pub fn calls_for(&self, serial: &str) -> Vec<CommandRequest> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.serial.as_ref().is_some_and(|s| s.as_str() == serial))
            .cloned()
            .collect()
    }

    /// Argument vectors (without serial) for `serial`, for compact asserts.
    pub fn args_for(&self, serial: &str) -> Vec<Vec<String>> {
        self.calls_for(serial).into_iter().map(|c| c.args).collect()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RunnerError> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        let deadline = Instant::now() + request.timeout;
        let mut reply = self.reply_for(request);
        loop {
            reply = match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(RunnerError::Cancelled),
                        () = tokio::time::sleep_until(deadline) => {
                            return Err(RunnerError::Timeout(request.timeout));
                        }
                        () = tokio::time::sleep(delay) => *inner,
                    }
                }
                MockReply::Stdout(bytes) => return Ok(bytes),
                MockReply::Failure { code, diagnostic } => {
                    return Err(RunnerError::ProcessFailure {
                        code: Some(code),
                        diagnostic,
                    });
                }
                MockReply::Timeout => return Err(RunnerError::Timeout(request.timeout)),
                MockReply::ToolNotFound => return Err(RunnerError::ToolNotFound("adb".into())),
            };
        }
    }
}
