//! Batch identity types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier shared by every job submitted in one dispatch call.
///
/// Carried in log fields so the per-device results of a fan-out can be
/// correlated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Generate a new random batch ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The first group is plenty to tell batches apart in a log.
        let full = self.0.to_string();
        write!(f, "{}", &full[..8])
    }
}
