//! The persisted lock naming the job currently advancing the sequence.
//!
//! Two states: no lock file (unlocked) or a lock file holding a
//! [`LockRecord`] (locked). The check-then-write in [`LockManager::acquire`]
//! is best-effort, not transactional; the scheduler liveness check is the
//! second line of defence against duplicate submission.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::LivenessFailure;
use crate::confirm::Confirm;
use crate::error::{Result, RunChainError};
use crate::model::LockRecord;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::store;
use crate::util::now_utc;

/// What the scheduler said about a locked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Confirmed queued or running.
    Running,
    /// Confirmed gone.
    NotRunning,
    /// The query failed or timed out; carries the reason.
    Unknown(String),
}

impl Liveness {
    /// Whether the job should be treated as running under `policy`.
    pub fn treat_as_running(&self, policy: LivenessFailure) -> bool {
        match self {
            Liveness::Running => true,
            Liveness::NotRunning => false,
            Liveness::Unknown(_) => policy == LivenessFailure::AssumeRunning,
        }
    }
}

/// Result of reconciling the lock against the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// No lock file.
    Unlocked,
    /// The lock still guards a job that is (treated as) running.
    Held {
        /// The lock as read.
        record: LockRecord,
        /// Scheduler answer.
        liveness: Liveness,
    },
    /// The lock outlived its job and may be released.
    Stale {
        /// The lock as read.
        record: LockRecord,
        /// Scheduler answer.
        liveness: Liveness,
    },
}

/// Outcome of a release request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// There was nothing to release.
    NoLock,
    /// The lock file was removed.
    Released(LockRecord),
    /// The operator declined.
    Declined,
}

/// Reads and writes the lock file.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    liveness_timeout: Duration,
    on_query_failure: LivenessFailure,
}

impl LockManager {
    /// Lock manager over the lock file at `path`.
    pub fn new(path: impl Into<PathBuf>, liveness_timeout: Duration, on_query_failure: LivenessFailure) -> Self {
        Self {
            path: path.into(),
            liveness_timeout,
            on_query_failure,
        }
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lock record, if any.
    pub fn load(&self) -> Result<Option<LockRecord>> {
        store::read_json(&self.path)
    }

    /// Unlocked → Locked.
    pub fn acquire(&self, job_id: &str, run_index: usize) -> Result<LockRecord> {
        if let Some(held) = self.load()? {
            return Err(RunChainError::AlreadyLocked {
                job_id: held.external_job_id,
                run_index: held.run_index,
            });
        }
        let record = LockRecord {
            external_job_id: job_id.to_string(),
            run_index,
            acquired_at: now_utc(),
            owner_process_id: std::process::id(),
        };
        store::write_json_atomic(&self.path, &record)?;
        info!(job_id, run_index, path = %self.path.display(), "lock acquired");
        Ok(record)
    }

    /// Locked → Unlocked. Without `force` the operator is asked first.
    pub fn release(&self, force: bool, confirm: &mut dyn Confirm) -> Result<ReleaseOutcome> {
        let Some(record) = self.load()? else {
            return Ok(ReleaseOutcome::NoLock);
        };
        if !force && !confirm.confirm(&format!("Remove lock file {}?", self.path.display())) {
            return Ok(ReleaseOutcome::Declined);
        }
        self.remove(&record)?;
        Ok(ReleaseOutcome::Released(record))
    }

    /// Unconditional release; returns the removed record, if there was one.
    pub fn force_release(&self) -> Result<Option<LockRecord>> {
        let Some(record) = self.load()? else {
            return Ok(None);
        };
        self.remove(&record)?;
        Ok(Some(record))
    }

    fn remove(&self, record: &LockRecord) -> Result<()> {
        store::remove_if_exists(&self.path)?;
        info!(
            job_id = %record.external_job_id,
            run_index = record.run_index,
            "lock released"
        );
        Ok(())
    }

    /// Asks the scheduler whether `job_id` is alive, bounded by the
    /// configured timeout. Never fails: errors become [`Liveness::Unknown`].
    pub async fn probe<S: Scheduler>(&self, scheduler: &S, job_id: &str) -> Liveness {
        let answer = match tokio::time::timeout(self.liveness_timeout, scheduler.is_live(job_id)).await {
            Ok(answer) => answer,
            Err(_) => Err(SchedulerError::Timeout {
                operation: "liveness query".into(),
                seconds: self.liveness_timeout.as_secs(),
            }),
        };
        match answer {
            Ok(true) => Liveness::Running,
            Ok(false) => Liveness::NotRunning,
            Err(e) => {
                warn!(job_id, error = %e, policy = ?self.on_query_failure, "liveness query failed");
                Liveness::Unknown(e.to_string())
            }
        }
    }

    /// Classifies the current lock as held or stale. Does not modify it.
    pub async fn reconcile<S: Scheduler>(&self, scheduler: &S) -> Result<Reconciliation> {
        let Some(record) = self.load()? else {
            return Ok(Reconciliation::Unlocked);
        };
        let liveness = self.probe(scheduler, &record.external_job_id).await;
        debug!(job_id = %record.external_job_id, ?liveness, "lock reconciled");
        if liveness.treat_as_running(self.on_query_failure) {
            Ok(Reconciliation::Held { record, liveness })
        } else {
            Ok(Reconciliation::Stale { record, liveness })
        }
    }
}
