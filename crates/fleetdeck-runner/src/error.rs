//! Runner errors.

use std::time::Duration;

use thiserror::Error;

/// Why one invocation of the control tool did not succeed.
///
/// `Cancelled`, `Timeout` and `ToolNotFound` are kept apart from
/// `ProcessFailure` so status reporting can tell a stop request from a
/// device-side error.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("control tool not found: {0} (install it and add it to PATH)")]
    ToolNotFound(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command cancelled")]
    Cancelled,

    #[error("command failed{}: {diagnostic}", exit_suffix(.code))]
    ProcessFailure {
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("failed to launch control tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit {c})")).unwrap_or_default()
}

impl RunnerError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
