//! Submission audit log.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, RunChainError};
use crate::model::AuditEntry;
use crate::store;
use crate::util::io_err;

/// Append-only plain-text record of submissions, one line per job.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Audit log at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry.
    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err(&self.path))?;
        writeln!(f, "{entry}").map_err(io_err(&self.path))?;
        Ok(())
    }

    /// All entries in order; an absent log is empty.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.path)(e)),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                line.parse::<AuditEntry>().map_err(|reason| RunChainError::CorruptState {
                    path: self.path.clone(),
                    reason: format!("line {}: {reason}", i + 1),
                })
            })
            .collect()
    }

    /// Deletes the log; returns whether it existed.
    pub fn clear(&self) -> Result<bool> {
        store::remove_if_exists(&self.path)
    }
}
