//! File-backed data pools for fleetdeck.
//!
//! A pool is a UTF-8 file with one entry per line. [`DataPool::allocate`]
//! hands each device a distinct entry and, for consumable pools, removes the
//! handed-out entries from the file. The file is always authoritative: every
//! call re-reads it and nothing is cached.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fleetdeck_types::{DeviceSerial, PoolKind};
use rand::seq::index;
use rand::Rng;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub mod error;

pub use error::PoolError;

/// Result of one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// One entry per device, in device order.
    pub assignments: Vec<(DeviceSerial, String)>,
    /// Distinct entries left in the pool afterwards.
    pub remaining: usize,
}

impl Allocation {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn value_for(&self, serial: &DeviceSerial) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(s, _)| s == serial)
            .map(|(_, v)| v.as_str())
    }
}

/// A pool file and its removal policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPool {
    path: PathBuf,
    kind: PoolKind,
}

impl DataPool {
    pub fn new(path: impl Into<PathBuf>, kind: PoolKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Distinct non-empty entries, in file order.
    pub fn entries(&self) -> Result<Vec<String>, PoolError> {
        Ok(parse_entries(&self.read()?))
    }

    /// Number of distinct entries left. Never mutates the file.
    pub fn remaining(&self) -> Result<usize, PoolError> {
        Ok(self.entries()?.len())
    }

    /// Give every device a distinct entry, sampled uniformly.
    pub fn allocate(&self, devices: &[DeviceSerial]) -> Result<Allocation, PoolError> {
        self.allocate_with(devices, &mut rand::thread_rng())
    }

    /// [`allocate`](Self::allocate) with a caller-supplied RNG.
    ///
    /// All-or-nothing: when the pool is short, nothing is assigned and the
    /// file is not touched.
    pub fn allocate_with<R: Rng + ?Sized>(
        &self,
        devices: &[DeviceSerial],
        rng: &mut R,
    ) -> Result<Allocation, PoolError> {
        let raw = self.read()?;
        let entries = parse_entries(&raw);

        if devices.is_empty() {
            return Ok(Allocation {
                assignments: Vec::new(),
                remaining: entries.len(),
            });
        }
        if entries.len() < devices.len() {
            warn!(
                pool = %self.path.display(),
                available = entries.len(),
                required = devices.len(),
                "not enough pool entries"
            );
            return Err(PoolError::InsufficientData {
                available: entries.len(),
                required: devices.len(),
            });
        }

        let assignments: Vec<(DeviceSerial, String)> =
            index::sample(rng, entries.len(), devices.len())
                .into_iter()
                .zip(devices)
                .map(|(i, serial)| (serial.clone(), entries[i].clone()))
                .collect();

        let remaining = if self.kind.removes_used() {
            let used: HashSet<&str> = assignments.iter().map(|(_, v)| v.as_str()).collect();
            self.remove(&raw, &used, entries.len() - devices.len())?
        } else {
            entries.len()
        };

        info!(
            pool = %self.path.display(),
            kind = %self.kind,
            allocated = assignments.len(),
            remaining,
            "allocated pool entries"
        );
        Ok(Allocation {
            assignments,
            remaining,
        })
    }

    fn read(&self) -> Result<String, PoolError> {
        fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PoolError::NoData(self.path.clone())
            } else {
                PoolError::io(&self.path, e)
            }
        })
    }

    /// Rewrite the file without `used`, as a verified transaction against
    /// the content the allocation was decided on (`basis`). Errors before
    /// `persist` leave the file untouched; a failed verification comes after
    /// it.
    fn remove(&self, basis: &str, used: &HashSet<&str>, expected: usize) -> Result<usize, PoolError> {
        if self.read()? != basis {
            return Err(PoolError::Conflict(self.path.clone()));
        }

        let mut content = String::with_capacity(basis.len());
        for line in basis.lines() {
            let entry = line.trim();
            if entry.is_empty() || used.contains(entry) {
                continue;
            }
            content.push_str(line.trim_end_matches('\r'));
            content.push('\n');
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PoolError::io(&self.path, e))?;
        if let Ok(meta) = fs::metadata(&self.path) {
            if let Err(e) = tmp.as_file().set_permissions(meta.permissions()) {
                debug!(error = %e, "could not copy pool file permissions");
            }
        }
        tmp.write_all(content.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| PoolError::io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| PoolError::io(&self.path, e.error))?;

        self.verify(expected)
    }

    /// Re-read the file after a persisted rewrite. A mismatch does not undo
    /// the rewrite; it is reported as [`PoolError::VerificationFailed`].
    fn verify(&self, expected: usize) -> Result<usize, PoolError> {
        let found = self.remaining()?;
        if found != expected {
            warn!(
                pool = %self.path.display(),
                expected,
                found,
                "pool rewritten but entry count does not match"
            );
            return Err(PoolError::VerificationFailed {
                path: self.path.clone(),
                expected,
                found,
            });
        }
        Ok(found)
    }
}

/// Trimmed, non-empty, distinct entries in first-seen order.
pub fn parse_entries(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.lines()
        .map(str::trim)
        .filter(|e| !e.is_empty() && seen.insert(*e))
        .map(str::to_string)
        .collect()
}
