use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::RunChainError;

/// Returns the current wall-clock time truncated to whole seconds.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Builds a closure mapping an io error on `path` into [`RunChainError::Io`].
pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RunChainError {
    let path: PathBuf = path.to_path_buf();
    move |source| RunChainError::Io { path, source }
}
