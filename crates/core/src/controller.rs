//! The submission controller: every operator action on a working directory.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::config::ChainConfig;
use crate::confirm::Confirm;
use crate::error::{Result, RunChainError};
use crate::lock::{Liveness, LockManager, Reconciliation, ReleaseOutcome};
use crate::model::{AuditEntry, LockRecord, RunPlan};
use crate::mutator::ConfigMutator;
use crate::progress;
use crate::scheduler::Scheduler;
use crate::store::{self, Layout};
use crate::time_control::read_time_control;
use crate::util::now_utc;

/// Result of `generate_plan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A new plan was written.
    Created(RunPlan),
    /// A plan existed and the operator chose to keep it.
    Kept,
}

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A live job already holds the lock; nothing was submitted.
    InProgress(LockRecord),
    /// Every run's artifacts exist.
    Complete {
        /// Runs in the plan.
        total_runs: usize,
    },
    /// A run was submitted and the lock taken.
    Submitted {
        /// 0-based run just submitted.
        run_index: usize,
        /// Runs in the plan.
        total_runs: usize,
        /// Scheduler job id.
        job_id: String,
    },
}

/// Result of `cancel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// No lock, so no job to cancel.
    NoLock,
    /// The job was cancelled and the lock released.
    Cancelled(LockRecord),
    /// The job was already gone; only the lock was released.
    ReleasedStale(LockRecord),
}

/// Result of `reset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOutcome {
    /// What happened to the locked job. `Err` carries the scheduler's
    /// reason when cancelling failed; the lock is then kept.
    pub cancel: std::result::Result<CancelOutcome, String>,
    /// Whether a plan file was deleted.
    pub plan_removed: bool,
}

/// Plan-level numbers for the status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    /// Runs in the plan.
    pub total_runs: usize,
    /// Runs whose artifacts all exist.
    pub completed_runs: usize,
    /// Simulation start.
    pub start_time: NaiveDateTime,
    /// Simulation end.
    pub end_time: NaiveDateTime,
}

/// Snapshot produced by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// `None` when no plan has been generated.
    pub plan: Option<PlanSummary>,
    /// Lock state at the time of the report.
    pub lock: Reconciliation,
    /// Whether a stale lock was removed after confirmation.
    pub stale_lock_removed: bool,
}

/// Sequencing controller bound to one working directory.
///
/// Holds no progress state of its own: every call re-reads the plan, the
/// lock and the artifacts from disk.
pub struct Controller<S> {
    layout: Layout,
    config: ChainConfig,
    locks: LockManager,
    audit: AuditLog,
    scheduler: S,
}

impl<S: Scheduler> Controller<S> {
    /// Controller over `root` using `config` file names and `scheduler`.
    pub fn new(root: impl Into<PathBuf>, config: ChainConfig, scheduler: S) -> Self {
        let layout = Layout::new(root, &config);
        let locks = LockManager::new(layout.lock(), config.liveness_timeout(), config.liveness_failure);
        let audit = AuditLog::new(layout.audit_log());
        Self {
            layout,
            config,
            locks,
            audit,
            scheduler,
        }
    }

    /// Resolved file layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Active settings.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Scheduler collaborator.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Lock manager.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Computes a plan from the source configuration and persists it.
    ///
    /// An existing plan is only replaced when `force` is set or the operator
    /// confirms. Planning errors abort before anything is written.
    pub fn generate_plan(&self, force: bool, confirm: &mut dyn Confirm) -> Result<PlanOutcome> {
        let path = self.layout.metadata();
        if path.exists()
            && !force
            && !confirm.confirm(&format!("Meta file {} already exists. Overwrite?", path.display()))
        {
            info!("plan generation cancelled");
            return Ok(PlanOutcome::Kept);
        }

        let tc = read_time_control(self.layout.source_config())?;
        let plan = RunPlan::build(&tc, &self.config.naming(), now_utc())?;
        store::write_json_atomic(path, &plan)?;
        info!(
            total_runs = plan.total_runs,
            start = %plan.start_time,
            end = %plan.end_time,
            path = %path.display(),
            "run plan written"
        );
        Ok(PlanOutcome::Created(plan))
    }

    /// The persisted plan, if any.
    pub fn try_load_plan(&self) -> Result<Option<RunPlan>> {
        let path = self.layout.metadata();
        let Some(plan) = store::read_json::<RunPlan>(path)? else {
            return Ok(None);
        };
        plan.check().map_err(|reason| RunChainError::CorruptState {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(Some(plan))
    }

    /// The persisted plan; [`RunChainError::PlanNotFound`] when absent.
    pub fn load_plan(&self) -> Result<RunPlan> {
        self.try_load_plan()?
            .ok_or_else(|| RunChainError::PlanNotFound(self.layout.metadata().to_path_buf()))
    }

    /// First run whose artifacts are incomplete, in `[0, total_runs]`.
    pub fn current_run_index(&self) -> Result<usize> {
        let plan = self.load_plan()?;
        Ok(progress::current_run_index(&plan, self.layout.root()))
    }

    /// Submits the next run if it is safe to do so. Submits at most one run.
    pub async fn advance(&self) -> Result<AdvanceOutcome> {
        let plan = self.try_load_plan()?;
        let next = plan
            .as_ref()
            .map(|p| (p, progress::current_run_index(p, self.layout.root())));

        // Completion wins over any lock state.
        if let Some((plan, current)) = next {
            if current >= plan.total_runs {
                info!(total_runs = plan.total_runs, "all runs completed");
                return Ok(AdvanceOutcome::Complete {
                    total_runs: plan.total_runs,
                });
            }
        }

        match self.locks.reconcile(&self.scheduler).await? {
            Reconciliation::Unlocked => {}
            Reconciliation::Held { record, .. } => {
                info!(job_id = %record.external_job_id, run = record.run_index + 1, "job already in progress");
                return Ok(AdvanceOutcome::InProgress(record));
            }
            Reconciliation::Stale { record, liveness } => {
                warn!(
                    job_id = %record.external_job_id,
                    ?liveness,
                    "lock exists but job is not running; removing lock"
                );
                self.locks.force_release()?;
            }
        }

        let Some((plan, current)) = next else {
            return Err(RunChainError::PlanNotFound(self.layout.metadata().to_path_buf()));
        };

        debug!(
            missing = ?progress::missing_artifacts(plan, self.layout.root(), current),
            "artifacts outstanding for next run"
        );
        info!(run = current + 1, total_runs = plan.total_runs, "submitting run");
        ConfigMutator::new(&self.layout).apply_with(plan, current)?;

        let script = self.layout.submit_script();
        if !script.exists() {
            return Err(RunChainError::SubmissionFailed(format!(
                "submission script not found: {}",
                script.display()
            )));
        }
        let job_id = self
            .scheduler
            .submit(script, self.layout.root())
            .await
            .map_err(|e| RunChainError::SubmissionFailed(e.to_string()))?;
        info!(job_id = %job_id, run = current + 1, "job submitted");

        let record = self.locks.acquire(&job_id, current)?;
        self.audit.append(&AuditEntry {
            timestamp: record.acquired_at,
            run_index: current,
            external_job_id: job_id.clone(),
        })?;

        Ok(AdvanceOutcome::Submitted {
            run_index: current,
            total_runs: plan.total_runs,
            job_id,
        })
    }

    /// Progress and lock snapshot. A stale lock is removed if the operator
    /// confirms.
    pub async fn status(&self, confirm: &mut dyn Confirm) -> Result<StatusReport> {
        let plan = self.try_load_plan()?.map(|p| PlanSummary {
            total_runs: p.total_runs,
            completed_runs: progress::current_run_index(&p, self.layout.root()),
            start_time: p.start_time,
            end_time: p.end_time,
        });

        let lock = self.locks.reconcile(&self.scheduler).await?;
        let mut stale_lock_removed = false;
        if let Reconciliation::Stale { record, .. } = &lock {
            let prompt = format!(
                "Lock for job {} exists but the job is not running. Remove lock file?",
                record.external_job_id
            );
            if confirm.confirm(&prompt) {
                self.locks.force_release()?;
                stale_lock_removed = true;
            }
        }

        Ok(StatusReport {
            plan,
            lock,
            stale_lock_removed,
        })
    }

    /// Removes the lock; asks first unless `force`.
    pub fn release_lock(&self, force: bool, confirm: &mut dyn Confirm) -> Result<ReleaseOutcome> {
        self.locks.release(force, confirm)
    }

    /// Cancels the locked job (when it may still be alive) and releases the
    /// lock. A failed cancel keeps the lock.
    pub async fn cancel(&self) -> Result<CancelOutcome> {
        let Some(record) = self.locks.load()? else {
            info!("no lock file; no job to cancel");
            return Ok(CancelOutcome::NoLock);
        };

        let liveness = self.locks.probe(&self.scheduler, &record.external_job_id).await;
        if liveness == Liveness::NotRunning {
            info!(job_id = %record.external_job_id, "job is not running; releasing lock");
            self.locks.force_release()?;
            return Ok(CancelOutcome::ReleasedStale(record));
        }

        self.scheduler
            .cancel(&record.external_job_id)
            .await
            .map_err(|e| RunChainError::CancelFailed {
                job_id: record.external_job_id.clone(),
                reason: e.to_string(),
            })?;
        info!(job_id = %record.external_job_id, "job cancelled");
        self.locks.force_release()?;
        Ok(CancelOutcome::Cancelled(record))
    }

    /// Cancels any current job and deletes the plan.
    ///
    /// A failed cancel is reported in the outcome and does not stop the plan
    /// from being deleted.
    pub async fn reset(&self) -> Result<ResetOutcome> {
        let cancel = match self.cancel().await {
            Ok(outcome) => Ok(outcome),
            Err(RunChainError::CancelFailed { job_id, reason }) => {
                warn!(%job_id, %reason, "cancel failed; removing run plan anyway");
                Err(format!("failed to cancel job {job_id}: {reason}"))
            }
            Err(e) => return Err(e),
        };
        let plan_removed = store::remove_if_exists(self.layout.metadata())?;
        if plan_removed {
            info!(path = %self.layout.metadata().display(), "run plan removed");
        }
        Ok(ResetOutcome {
            cancel,
            plan_removed,
        })
    }

    /// Deletes the audit log; returns whether it existed.
    pub fn clear_audit_log(&self) -> Result<bool> {
        self.audit.clear()
    }
}
