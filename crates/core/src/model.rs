//! Records persisted in the working directory.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// The persisted plan for the whole chain of runs.
///
/// Created once from the source configuration; progress is never stored
/// here, only the artifacts each run is expected to leave behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunPlan {
    /// Number of runs; always at least 1.
    pub total_runs: usize,
    /// Simulation start.
    pub start_time: NaiveDateTime,
    /// Simulation end.
    pub end_time: NaiveDateTime,
    /// Length of one run in seconds; always positive.
    pub run_duration_seconds: i64,
    /// Artifact names per run, indexed by run.
    pub expected_artifacts: Vec<Vec<String>>,
    /// When the plan was generated.
    pub created_at: DateTime<Utc>,
}

impl RunPlan {
    /// Length of one run; `None` when the stored length is out of range.
    pub fn run_duration(&self) -> Option<TimeDelta> {
        TimeDelta::try_seconds(self.run_duration_seconds)
    }

    /// Time window and restart flag for `run_index`, or `None` when the
    /// window falls outside the representable calendar.
    pub fn window(&self, run_index: usize) -> Option<RunWindow> {
        let len = self.run_duration()?;
        let offset = len.checked_mul(i32::try_from(run_index).ok()?)?;
        let start = self.start_time.checked_add_signed(offset)?;
        let end = start.checked_add_signed(len)?;
        Some(RunWindow {
            run_index,
            start,
            end,
            restart: run_index > 0,
        })
    }
}

/// The slice of simulated time covered by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    /// 0-based run index.
    pub run_index: usize,
    /// Inclusive window start.
    pub start: NaiveDateTime,
    /// Exclusive window end; also the run's completion timestamp.
    pub end: NaiveDateTime,
    /// Whether the simulation resumes from restart files.
    pub restart: bool,
}

/// Claim that one external job is currently advancing the sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    /// Scheduler job id.
    pub external_job_id: String,
    /// 0-based run the job is executing.
    pub run_index: usize,
    /// When the lock was written.
    pub acquired_at: DateTime<Utc>,
    /// Process that submitted the job. Informational only.
    pub owner_process_id: u32,
}

/// One line of the submission audit log.
///
/// Rendered as `<timestamp> | Run <n> | Job ID: <id>` where `n` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Submission time.
    pub timestamp: DateTime<Utc>,
    /// 0-based run that was submitted.
    pub run_index: usize,
    /// Scheduler job id.
    pub external_job_id: String,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | Run {} | Job ID: {}",
            self.timestamp.to_rfc3339(),
            self.run_index + 1,
            self.external_job_id
        )
    }
}

impl FromStr for AuditEntry {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.splitn(3, " | ");
        let (Some(ts), Some(run), Some(job)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected three '|' separated fields: {line}"));
        };
        let timestamp = DateTime::parse_from_rfc3339(ts.trim())
            .map_err(|e| format!("bad timestamp '{ts}': {e}"))?
            .with_timezone(&Utc);
        let run: usize = run
            .trim()
            .strip_prefix("Run ")
            .and_then(|n| n.parse().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("bad run field '{run}'"))?;
        let external_job_id = job
            .trim()
            .strip_prefix("Job ID: ")
            .ok_or_else(|| format!("bad job field '{job}'"))?
            .to_string();
        Ok(Self {
            timestamp,
            run_index: run - 1,
            external_job_id,
        })
    }
}
