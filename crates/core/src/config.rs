//! Per-directory settings read from `runchain.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunChainError};
use crate::plan::ArtifactNaming;

/// Default settings file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "runchain.toml";

/// What to conclude when the scheduler cannot answer a liveness query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LivenessFailure {
    /// Fail-open: presume the job finished so the sequence can move on.
    #[default]
    AssumeFinished,
    /// Fail-safe: presume the job is still running and refuse to submit.
    AssumeRunning,
}

/// Operator settings for one working directory.
///
/// Every field has a default, so an absent `runchain.toml` is equivalent to
/// an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    /// Immutable source namelist, never written by the controller.
    pub source_config: PathBuf,
    /// Namelist rewritten before every submission.
    pub working_config: PathBuf,
    /// Persisted run plan.
    pub metadata_file: PathBuf,
    /// Persisted lock record.
    pub lock_file: PathBuf,
    /// Append-only submission record.
    pub audit_log: PathBuf,
    /// Batch script handed to the scheduler.
    pub submit_script: PathBuf,
    /// Domain identifiers that appear in artifact names.
    pub domains: Vec<String>,
    /// Artifact prefixes; each run expects one file per prefix per domain.
    pub artifact_prefixes: Vec<String>,
    /// Upper bound on a single liveness query.
    pub liveness_timeout_secs: u64,
    /// Policy applied when a liveness query fails or times out.
    pub liveness_failure: LivenessFailure,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            source_config: "namelist.input.original".into(),
            working_config: "namelist.input".into(),
            metadata_file: ".meta".into(),
            lock_file: ".lock".into(),
            audit_log: "submit_record.txt".into(),
            submit_script: "submit.sh".into(),
            domains: vec!["d01".into()],
            artifact_prefixes: vec!["wrfout".into(), "wrfrst".into()],
            liveness_timeout_secs: 10,
            liveness_failure: LivenessFailure::default(),
        }
    }
}

impl ChainConfig {
    /// Loads settings from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RunChainError::ConfigNotFound(path.to_path_buf())
            } else {
                RunChainError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let cfg: ChainConfig = toml::from_str(&text).map_err(|e| RunChainError::ConfigMalformed {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })?;
        cfg.validate(path)?;
        Ok(cfg)
    }

    /// Loads `explicit` if given, otherwise `runchain.toml` under `work_dir`
    /// when present, otherwise defaults.
    pub fn discover(work_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let path = work_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let malformed = |reason: &str| RunChainError::ConfigMalformed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.domains.is_empty() {
            return Err(malformed("`domains` must name at least one domain"));
        }
        if self.artifact_prefixes.is_empty() {
            return Err(malformed("`artifact_prefixes` must not be empty"));
        }
        if self.liveness_timeout_secs == 0 {
            return Err(malformed("`liveness_timeout_secs` must be positive"));
        }
        Ok(())
    }

    /// Artifact naming convention derived from these settings.
    pub fn naming(&self) -> ArtifactNaming {
        ArtifactNaming {
            prefixes: self.artifact_prefixes.clone(),
            domains: self.domains.clone(),
        }
    }

    /// Liveness query bound.
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}
