//! Error taxonomy of the controller library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the run-sequencing controller.
#[derive(Debug, Error)]
pub enum RunChainError {
    /// The immutable source configuration is absent.
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// A configuration file exists but required fields are missing or invalid.
    #[error("malformed configuration {}: {reason}", path.display())]
    ConfigMalformed {
        /// Offending file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// The per-run duration sums to zero or less, or is so long that the
    /// run windows leave the representable calendar.
    #[error("unusable run length of {seconds}s; it must be positive and keep every run inside the calendar")]
    DegenerateRunLength {
        /// Summed `run_*` fields.
        seconds: i64,
    },

    /// The simulation window yields no runs (end is not after start).
    #[error("computed number of runs is {runs}; the end time must be after the start time")]
    NonPositiveRunCount {
        /// Computed count.
        runs: i64,
    },

    /// No run plan has been persisted yet.
    #[error("run plan not found at {}; generate one first", .0.display())]
    PlanNotFound(PathBuf),

    /// A lock is already held.
    #[error("sequence already locked by job {job_id} (run {})", run_index + 1)]
    AlreadyLocked {
        /// Job named by the existing lock.
        job_id: String,
        /// 0-based run that job is executing.
        run_index: usize,
    },

    /// The scheduler rejected or failed the submission.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// The scheduler could not cancel the locked job.
    #[error("failed to cancel job {job_id}: {reason}")]
    CancelFailed {
        /// Job that could not be cancelled.
        job_id: String,
        /// Scheduler error text.
        reason: String,
    },

    /// A write-temp-then-rename replacement did not complete.
    #[error("failed to replace {} atomically: {source}", path.display())]
    AtomicWriteFailed {
        /// File being replaced.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Reading or removing a persisted file failed.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A persisted metadata or lock file exists but cannot be understood.
    #[error("corrupt state file {}: {reason}", path.display())]
    CorruptState {
        /// Unreadable file.
        path: PathBuf,
        /// Parse or consistency failure.
        reason: String,
    },
}

/// Crate result alias.
pub type Result<T, E = RunChainError> = std::result::Result<T, E>;
