//! Pool subsystem errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool file not found: {}", .0.display())]
    NoData(PathBuf),

    #[error("not enough data: {available} unused entries for {required} devices")]
    InsufficientData { available: usize, required: usize },

    #[error("pool file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file changed between the read that chose the values and the
    /// rewrite that removes them.
    #[error("pool file {} changed during allocation", .0.display())]
    Conflict(PathBuf),

    /// The rewrite was persisted, but re-reading the file found `found`
    /// entries instead of `expected`. The allocated values are already gone
    /// from the file; `found` is what it holds now.
    #[error("pool file {} holds {found} entries after rewrite, expected {expected}", path.display())]
    VerificationFailed {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

impl PoolError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
