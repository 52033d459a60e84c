//! File layout of a working directory and crash-safe file replacement.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::ChainConfig;
use crate::error::{Result, RunChainError};
use crate::util::io_err;

/// Resolved paths of every file the controller reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    source_config: PathBuf,
    working_config: PathBuf,
    metadata: PathBuf,
    lock: PathBuf,
    audit_log: PathBuf,
    submit_script: PathBuf,
}

impl Layout {
    /// Resolves the configured file names against `root`.
    pub fn new(root: impl Into<PathBuf>, cfg: &ChainConfig) -> Self {
        let root = root.into();
        Self {
            source_config: root.join(&cfg.source_config),
            working_config: root.join(&cfg.working_config),
            metadata: root.join(&cfg.metadata_file),
            lock: root.join(&cfg.lock_file),
            audit_log: root.join(&cfg.audit_log),
            submit_script: root.join(&cfg.submit_script),
            root,
        }
    }

    /// Working directory; artifacts are resolved against it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Immutable source namelist.
    pub fn source_config(&self) -> &Path {
        &self.source_config
    }

    /// Namelist handed to the next run.
    pub fn working_config(&self) -> &Path {
        &self.working_config
    }

    /// Run plan file.
    pub fn metadata(&self) -> &Path {
        &self.metadata
    }

    /// Lock file.
    pub fn lock(&self) -> &Path {
        &self.lock
    }

    /// Audit log.
    pub fn audit_log(&self) -> &Path {
        &self.audit_log
    }

    /// Batch script.
    pub fn submit_script(&self) -> &Path {
        &self.submit_script
    }
}

/// Replaces `path` with `bytes` via a temp file in the same directory and a
/// rename, so readers see either the old or the new content.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let failed = |source| RunChainError::AtomicWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(bytes).map_err(failed)?;
    tmp.flush().map_err(failed)?;
    tmp.as_file().sync_all().map_err(failed)?;
    tmp.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| RunChainError::CorruptState {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Reads a JSON file, returning `None` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path)(e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| RunChainError::CorruptState {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Deletes `path`; returns whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path)(e)),
    }
}
