//! Data pool kinds.

use serde::{Deserialize, Serialize};

/// How a data pool treats entries once they have been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Used entries are removed from the file (names, passwords).
    #[default]
    Consumable,
    /// The file is never rewritten (days, years).
    Persistent,
}

impl PoolKind {
    #[must_use]
    pub fn removes_used(self) -> bool {
        self == Self::Consumable
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consumable => write!(f, "consumable"),
            Self::Persistent => write!(f, "persistent"),
        }
    }
}
