//! Seam to the external batch scheduler.

use std::path::Path;

use thiserror::Error;

/// Failure talking to the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler tool is not installed or not on `PATH`.
    #[error("{0} not found on PATH")]
    Unavailable(String),

    /// The query did not finish within its bound.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// The bound that elapsed.
        seconds: u64,
    },

    /// The tool ran and reported failure.
    #[error("{program} failed: {detail}")]
    CommandFailed {
        /// Tool that failed.
        program: String,
        /// Its stderr, or the exit status when stderr is empty.
        detail: String,
    },

    /// The tool succeeded but its output carried no job id.
    #[error("could not find a job id in scheduler response: {0:?}")]
    UnparsableResponse(String),
}

/// Operations the controller needs from a batch scheduler.
///
/// Implementations only report what the scheduler says; deciding what a
/// failed liveness query means is left to [`crate::lock::LockManager`].
#[allow(async_fn_in_trait)]
pub trait Scheduler {
    /// Submits `script` with `work_dir` as the job's working directory and
    /// returns the job id.
    async fn submit(&self, script: &Path, work_dir: &Path) -> Result<String, SchedulerError>;

    /// Whether `job_id` is still queued or running.
    async fn is_live(&self, job_id: &str) -> Result<bool, SchedulerError>;

    /// Asks the scheduler to terminate `job_id`.
    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError>;
}

/// Extracts the job id from a submission response.
///
/// Accepts the human-readable `Submitted batch job 12345` line (the id is
/// its last token) and the `--parsable` form `12345[;cluster]`.
pub fn parse_submission_response(stdout: &str) -> Result<String, SchedulerError> {
    let unparsable = || SchedulerError::UnparsableResponse(stdout.trim().to_string());

    if let Some(line) = stdout.lines().find(|l| l.trim_start().starts_with("Submitted batch job")) {
        return line
            .split_whitespace()
            .last()
            .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .ok_or_else(unparsable);
    }

    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty()).ok_or_else(unparsable)?;
    let id = first.split(';').next().unwrap_or(first);
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit() || c == '_') {
        Ok(id.to_string())
    } else {
        Err(unparsable())
    }
}
