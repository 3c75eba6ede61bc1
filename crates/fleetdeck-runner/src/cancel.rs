//! Settable, clearable cancellation shared by every dispatched task.

use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

/// Process-wide stop flag.
///
/// Each generation is a [`CancellationToken`]. Tasks capture the current
/// token when they are submitted and watch only that token, so clearing the
/// signal never resurrects work that was already told to stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    current: Arc<RwLock<CancellationToken>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a task being submitted now.
    pub fn token(&self) -> CancellationToken {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Cancel every task holding the current token.
    pub fn set(&self) {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .cancel();
    }

    /// Return to normal operation. No-op if the signal is not set.
    pub fn clear(&self) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
    }

    pub fn is_set(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_cancelled()
    }
}
