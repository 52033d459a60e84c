//! End-to-end tests of the controller against a temp working directory and an
//! in-process scheduler.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use runchain_core::namelist::{Namelist, Value};
use runchain_core::{
    AdvanceOutcome, CancelOutcome, ChainConfig, Controller, LivenessFailure, PlanOutcome,
    Reconciliation, RunChainError, Scheduler, SchedulerError,
};
use tempfile::TempDir;

#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum QueryMode {
    #[default]
    Answer,
    Fail,
    Hang,
}

#[derive(Default)]
struct FakeScheduler {
    next_id: Cell<u32>,
    live: RefCell<HashSet<String>>,
    submitted: RefCell<Vec<(PathBuf, PathBuf)>>,
    cancelled: RefCell<Vec<String>>,
    fail_submit: Cell<bool>,
    fail_cancel: Cell<bool>,
    query: Cell<QueryMode>,
}

impl FakeScheduler {
    fn finish(&self, job_id: &str) {
        self.live.borrow_mut().remove(job_id);
    }

    fn submissions(&self) -> usize {
        self.submitted.borrow().len()
    }
}

impl Scheduler for FakeScheduler {
    async fn submit(&self, script: &Path, work_dir: &Path) -> Result<String, SchedulerError> {
        if self.fail_submit.get() {
            return Err(SchedulerError::CommandFailed {
                program: "sbatch".into(),
                detail: "Batch job submission failed: queue closed".into(),
            });
        }
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        let id = (5000 + n).to_string();
        self.live.borrow_mut().insert(id.clone());
        self.submitted
            .borrow_mut()
            .push((script.to_path_buf(), work_dir.to_path_buf()));
        Ok(id)
    }

    async fn is_live(&self, job_id: &str) -> Result<bool, SchedulerError> {
        match self.query.get() {
            QueryMode::Answer => Ok(self.live.borrow().contains(job_id)),
            QueryMode::Fail => Err(SchedulerError::Unavailable("squeue".into())),
            QueryMode::Hang => std::future::pending().await,
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        if self.fail_cancel.get() {
            return Err(SchedulerError::CommandFailed {
                program: "scancel".into(),
                detail: "permission denied".into(),
            });
        }
        self.live.borrow_mut().remove(job_id);
        self.cancelled.borrow_mut().push(job_id.to_string());
        Ok(())
    }
}

const SOURCE: &str = "&time_control
 run_days     = 1,
 run_hours    = 0,
 start_year   = 2024, start_month  = 01, start_day    = 01,
 start_hour   = 00,   start_minute = 00, start_second = 00,
 end_year     = 2024, end_month    = 01, end_day      = 03,
 end_hour     = 00,   end_minute   = 00, end_second   = 00,
 restart      = .false.,
/
";

struct Fixture {
    _dir: TempDir,
    ctrl: Controller<FakeScheduler>,
}

fn fixture_with(config: ChainConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("namelist.input.original"), SOURCE).unwrap();
    std::fs::write(dir.path().join("submit.sh"), "#!/bin/bash\n./wrf.exe\n").unwrap();
    let ctrl = Controller::new(dir.path(), config, FakeScheduler::default());
    Fixture { _dir: dir, ctrl }
}

fn fixture() -> Fixture {
    fixture_with(ChainConfig::default())
}

fn yes() -> impl FnMut(&str) -> bool {
    |_: &str| true
}

fn never_asked() -> impl FnMut(&str) -> bool {
    |prompt: &str| -> bool { panic!("unexpected prompt: {prompt}") }
}

impl Fixture {
    fn root(&self) -> &Path {
        self.ctrl.layout().root()
    }

    fn plan(&self) {
        let outcome = self.ctrl.generate_plan(false, &mut never_asked()).unwrap();
        assert!(matches!(outcome, PlanOutcome::Created(_)));
    }

    fn complete_run(&self, run: usize) {
        let plan = self.ctrl.load_plan().unwrap();
        for name in &plan.expected_artifacts[run] {
            std::fs::write(self.root().join(name), b"").unwrap();
        }
    }

    fn working_restart(&self) -> Option<bool> {
        let text = std::fs::read_to_string(self.ctrl.layout().working_config()).unwrap();
        let nml: Namelist = text.parse().unwrap();
        nml.group("time_control")?.first("restart")?.as_bool()
    }

    async fn submit(&self) -> String {
        match self.ctrl.advance().await.unwrap() {
            AdvanceOutcome::Submitted { job_id, .. } => job_id,
            other => panic!("expected a submission, got {other:?}"),
        }
    }
}

#[test]
fn plan_for_two_daily_runs() {
    let fx = fixture();
    let PlanOutcome::Created(plan) = fx.ctrl.generate_plan(false, &mut never_asked()).unwrap() else {
        panic!("plan not created");
    };
    assert_eq!(plan.total_runs, 2);
    assert_eq!(plan.expected_artifacts.len(), 2);
    assert!(plan.expected_artifacts[0].contains(&"wrfout_d01_2024-01-02_00:00:00".to_string()));
    assert!(plan.expected_artifacts[1].contains(&"wrfrst_d01_2024-01-03_00:00:00".to_string()));
    assert_eq!(fx.ctrl.load_plan().unwrap(), plan);
    assert_eq!(fx.ctrl.current_run_index().unwrap(), 0);
}

#[test]
fn existing_plan_is_kept_unless_confirmed_or_forced() {
    let fx = fixture();
    fx.plan();
    let original = fx.ctrl.load_plan().unwrap();

    let mut prompts = Vec::new();
    let outcome = fx
        .ctrl
        .generate_plan(false, &mut |p: &str| {
            prompts.push(p.to_string());
            false
        })
        .unwrap();
    assert_eq!(outcome, PlanOutcome::Kept);
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("already exists"));
    assert_eq!(fx.ctrl.load_plan().unwrap(), original);

    let outcome = fx.ctrl.generate_plan(false, &mut yes()).unwrap();
    assert!(matches!(outcome, PlanOutcome::Created(_)));

    let outcome = fx.ctrl.generate_plan(true, &mut never_asked()).unwrap();
    assert!(matches!(outcome, PlanOutcome::Created(_)));
}

#[test]
fn planning_errors_write_nothing() {
    let fx = fixture();
    let degenerate = SOURCE.replace("end_day      = 03", "end_day      = 01");
    std::fs::write(fx.ctrl.layout().source_config(), degenerate).unwrap();
    assert!(matches!(
        fx.ctrl.generate_plan(false, &mut never_asked()),
        Err(RunChainError::NonPositiveRunCount { .. })
    ));
    assert!(!fx.ctrl.layout().metadata().exists());

    let zero_length = SOURCE.replace("run_days     = 1", "run_days     = 0");
    std::fs::write(fx.ctrl.layout().source_config(), zero_length).unwrap();
    assert!(matches!(
        fx.ctrl.generate_plan(false, &mut never_asked()),
        Err(RunChainError::DegenerateRunLength { seconds: 0 })
    ));

    std::fs::remove_file(fx.ctrl.layout().source_config()).unwrap();
    assert!(matches!(
        fx.ctrl.generate_plan(false, &mut never_asked()),
        Err(RunChainError::ConfigNotFound(_))
    ));
    assert!(!fx.ctrl.layout().metadata().exists());
}

#[test]
fn oversized_run_length_is_rejected_without_writing() {
    let fx = fixture();
    for days in ["200000000", "200000000000"] {
        let source = SOURCE.replace("run_days     = 1", &format!("run_days     = {days}"));
        std::fs::write(fx.ctrl.layout().source_config(), source).unwrap();
        let err = fx.ctrl.generate_plan(false, &mut never_asked()).unwrap_err();
        assert!(
            matches!(err, RunChainError::DegenerateRunLength { .. }),
            "run_days = {days}: {err:?}"
        );
        assert!(!fx.ctrl.layout().metadata().exists());
    }
}

#[tokio::test]
async fn advance_without_plan_fails() {
    let fx = fixture();
    assert!(matches!(fx.ctrl.advance().await, Err(RunChainError::PlanNotFound(_))));
    assert!(matches!(fx.ctrl.current_run_index(), Err(RunChainError::PlanNotFound(_))));
    assert_eq!(fx.ctrl.scheduler().submissions(), 0);
}

#[tokio::test]
async fn first_advance_submits_run_zero() {
    let fx = fixture();
    fx.plan();

    let outcome = fx.ctrl.advance().await.unwrap();
    let AdvanceOutcome::Submitted {
        run_index,
        total_runs,
        job_id,
    } = outcome
    else {
        panic!("expected submission, got {outcome:?}");
    };
    assert_eq!((run_index, total_runs), (0, 2));

    let lock = fx.ctrl.locks().load().unwrap().expect("lock written");
    assert_eq!(lock.external_job_id, job_id);
    assert_eq!(lock.run_index, 0);

    let audit = fx.ctrl.audit().entries().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].external_job_id, job_id);

    assert_eq!(fx.working_restart(), Some(false));
    let (script, work_dir) = fx.ctrl.scheduler().submitted.borrow()[0].clone();
    assert_eq!(script, fx.root().join("submit.sh"));
    assert_eq!(work_dir, fx.root());
}

#[tokio::test]
async fn advance_is_idempotent_while_job_is_live() {
    let fx = fixture();
    fx.plan();
    let job = fx.submit().await;

    for _ in 0..2 {
        match fx.ctrl.advance().await.unwrap() {
            AdvanceOutcome::InProgress(lock) => assert_eq!(lock.external_job_id, job),
            other => panic!("expected in-progress, got {other:?}"),
        }
    }
    assert_eq!(fx.ctrl.scheduler().submissions(), 1);
    assert_eq!(fx.ctrl.audit().entries().unwrap().len(), 1);
}

#[tokio::test]
async fn stale_lock_is_released_and_next_run_submitted() {
    let fx = fixture();
    fx.plan();
    let first = fx.submit().await;

    fx.complete_run(0);
    fx.ctrl.scheduler().finish(&first);

    let outcome = fx.ctrl.advance().await.unwrap();
    let AdvanceOutcome::Submitted { run_index, job_id, .. } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    assert_eq!(run_index, 1);
    assert_ne!(job_id, first);
    assert_eq!(fx.working_restart(), Some(true));
    assert_eq!(fx.ctrl.locks().load().unwrap().unwrap().external_job_id, job_id);
}

#[tokio::test]
async fn crashed_run_is_resubmitted() {
    let fx = fixture();
    fx.plan();
    let first = fx.submit().await;

    // Job died without writing its artifacts.
    fx.ctrl.scheduler().finish(&first);
    let outcome = fx.ctrl.advance().await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Submitted { run_index: 0, .. }));
}

#[tokio::test]
async fn completion_is_reported_regardless_of_lock() {
    let fx = fixture();
    fx.plan();
    fx.submit().await;
    fx.complete_run(0);
    fx.complete_run(1);

    // The last job is still live, yet the sequence is complete.
    let outcome = fx.ctrl.advance().await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Complete { total_runs: 2 });
    assert_eq!(fx.ctrl.scheduler().submissions(), 1);
    assert_eq!(fx.ctrl.current_run_index().unwrap(), 2);
}

#[tokio::test]
async fn failed_submission_leaves_no_lock_or_audit() {
    let fx = fixture();
    fx.plan();
    fx.ctrl.scheduler().fail_submit.set(true);

    let err = fx.ctrl.advance().await.unwrap_err();
    match err {
        RunChainError::SubmissionFailed(msg) => assert!(msg.contains("queue closed"), "{msg}"),
        other => panic!("expected SubmissionFailed, got {other:?}"),
    }
    assert!(fx.ctrl.locks().load().unwrap().is_none());
    assert!(fx.ctrl.audit().entries().unwrap().is_empty());
    // The working configuration is already in place for the retry.
    assert_eq!(fx.working_restart(), Some(false));

    fx.ctrl.scheduler().fail_submit.set(false);
    assert!(matches!(
        fx.ctrl.advance().await.unwrap(),
        AdvanceOutcome::Submitted { run_index: 0, .. }
    ));
}

#[tokio::test]
async fn missing_script_is_a_submission_failure() {
    let fx = fixture();
    fx.plan();
    std::fs::remove_file(fx.root().join("submit.sh")).unwrap();
    assert!(matches!(
        fx.ctrl.advance().await,
        Err(RunChainError::SubmissionFailed(_))
    ));
    assert_eq!(fx.ctrl.scheduler().submissions(), 0);
    assert!(fx.ctrl.locks().load().unwrap().is_none());
}

#[tokio::test]
async fn failed_liveness_query_is_fail_open_by_default() {
    let fx = fixture();
    fx.plan();
    fx.submit().await;
    fx.ctrl.scheduler().query.set(QueryMode::Fail);

    let outcome = fx.ctrl.advance().await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Submitted { run_index: 0, .. }));
    assert_eq!(fx.ctrl.scheduler().submissions(), 2);
}

#[tokio::test]
async fn failed_liveness_query_blocks_under_fail_safe_policy() {
    let fx = fixture_with(ChainConfig {
        liveness_failure: LivenessFailure::AssumeRunning,
        ..ChainConfig::default()
    });
    fx.plan();
    fx.submit().await;
    fx.ctrl.scheduler().query.set(QueryMode::Fail);

    let outcome = fx.ctrl.advance().await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::InProgress(_)));
    assert_eq!(fx.ctrl.scheduler().submissions(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_liveness_query_times_out() {
    let fx = fixture();
    fx.plan();
    fx.submit().await;
    fx.ctrl.scheduler().query.set(QueryMode::Hang);

    let outcome = fx.ctrl.advance().await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Submitted { .. }));
}

#[tokio::test]
async fn status_reports_progress_and_lock() {
    let fx = fixture();
    let report = fx.ctrl.status(&mut never_asked()).await.unwrap();
    assert!(report.plan.is_none());
    assert_eq!(report.lock, Reconciliation::Unlocked);

    fx.plan();
    let job = fx.submit().await;
    let report = fx.ctrl.status(&mut never_asked()).await.unwrap();
    let plan = report.plan.unwrap();
    assert_eq!((plan.completed_runs, plan.total_runs), (0, 2));
    assert!(matches!(&report.lock, Reconciliation::Held { record, .. } if record.external_job_id == job));
    assert!(!report.stale_lock_removed);
}

#[tokio::test]
async fn status_offers_to_remove_stale_lock() {
    let fx = fixture();
    fx.plan();
    let job = fx.submit().await;
    fx.ctrl.scheduler().finish(&job);

    let report = fx.ctrl.status(&mut |_: &str| false).await.unwrap();
    assert!(matches!(report.lock, Reconciliation::Stale { .. }));
    assert!(!report.stale_lock_removed);
    assert!(fx.ctrl.locks().load().unwrap().is_some());

    let report = fx.ctrl.status(&mut yes()).await.unwrap();
    assert!(report.stale_lock_removed);
    assert!(fx.ctrl.locks().load().unwrap().is_none());
}

#[tokio::test]
async fn cancel_live_job_releases_lock() {
    let fx = fixture();
    fx.plan();
    let job = fx.submit().await;

    let outcome = fx.ctrl.cancel().await.unwrap();
    assert!(matches!(outcome, CancelOutcome::Cancelled(r) if r.external_job_id == job));
    assert_eq!(*fx.ctrl.scheduler().cancelled.borrow(), vec![job]);
    assert!(fx.ctrl.locks().load().unwrap().is_none());

    assert_eq!(fx.ctrl.cancel().await.unwrap(), CancelOutcome::NoLock);
}

#[tokio::test]
async fn cancel_of_finished_job_only_releases_lock() {
    let fx = fixture();
    fx.plan();
    let job = fx.submit().await;
    fx.ctrl.scheduler().finish(&job);

    let outcome = fx.ctrl.cancel().await.unwrap();
    assert!(matches!(outcome, CancelOutcome::ReleasedStale(_)));
    assert!(fx.ctrl.scheduler().cancelled.borrow().is_empty());
    assert!(fx.ctrl.locks().load().unwrap().is_none());
}

#[tokio::test]
async fn failed_cancel_keeps_lock() {
    let fx = fixture();
    fx.plan();
    fx.submit().await;
    fx.ctrl.scheduler().fail_cancel.set(true);

    assert!(matches!(
        fx.ctrl.cancel().await,
        Err(RunChainError::CancelFailed { .. })
    ));
    assert!(fx.ctrl.locks().load().unwrap().is_some());
}

#[tokio::test]
async fn reset_cancels_and_removes_plan() {
    let fx = fixture();
    fx.plan();
    fx.submit().await;

    let outcome = fx.ctrl.reset().await.unwrap();
    assert!(matches!(outcome.cancel, Ok(CancelOutcome::Cancelled(_))));
    assert!(outcome.plan_removed);
    assert!(!fx.ctrl.layout().metadata().exists());
    // The audit trail survives a reset.
    assert_eq!(fx.ctrl.audit().entries().unwrap().len(), 1);

    let again = fx.ctrl.reset().await.unwrap();
    assert_eq!(again.cancel, Ok(CancelOutcome::NoLock));
    assert!(!again.plan_removed);
}

#[tokio::test]
async fn reset_removes_plan_even_when_cancel_fails() {
    let fx = fixture();
    fx.plan();
    let job = fx.submit().await;
    fx.ctrl.scheduler().fail_cancel.set(true);

    let outcome = fx.ctrl.reset().await.unwrap();
    let reason = outcome.cancel.unwrap_err();
    assert!(reason.contains(&job), "{reason}");
    assert!(reason.contains("permission denied"), "{reason}");
    assert!(outcome.plan_removed);
    assert!(!fx.ctrl.layout().metadata().exists());
    // The job may still be running, so its lock stays.
    assert_eq!(fx.ctrl.locks().load().unwrap().unwrap().external_job_id, job);
}

#[tokio::test]
async fn release_lock_honours_confirmation() {
    let fx = fixture();
    fx.plan();
    fx.submit().await;

    let declined = fx.ctrl.release_lock(false, &mut |_: &str| false).unwrap();
    assert_eq!(declined, runchain_core::ReleaseOutcome::Declined);
    assert!(fx.ctrl.locks().load().unwrap().is_some());

    let forced = fx.ctrl.release_lock(true, &mut never_asked()).unwrap();
    assert!(matches!(forced, runchain_core::ReleaseOutcome::Released(_)));
    assert!(fx.ctrl.locks().load().unwrap().is_none());
}

#[tokio::test]
async fn drives_whole_chain_to_completion() {
    let config = ChainConfig {
        domains: vec!["d01".into(), "d02".into()],
        ..ChainConfig::default()
    };
    let fx = fixture_with(config);
    let longer = SOURCE
        .replace("end_day      = 03", "end_day      = 05")
        .replace("run_days     = 1", "run_days     = 0")
        .replace("run_hours    = 0", "run_hours    = 18");
    std::fs::write(fx.ctrl.layout().source_config(), longer).unwrap();
    fx.plan();
    let total = fx.ctrl.load_plan().unwrap().total_runs;
    // 96 hours in 18 hour runs.
    assert_eq!(total, 6);
    assert_eq!(fx.ctrl.load_plan().unwrap().expected_artifacts[0].len(), 4);

    for run in 0..total {
        let job = fx.submit().await;
        assert_eq!(fx.ctrl.locks().load().unwrap().unwrap().run_index, run);
        assert_eq!(fx.working_restart(), Some(run > 0));
        fx.complete_run(run);
        fx.ctrl.scheduler().finish(&job);
    }

    assert_eq!(
        fx.ctrl.advance().await.unwrap(),
        AdvanceOutcome::Complete { total_runs: total }
    );
    let runs: Vec<usize> = fx
        .ctrl
        .audit()
        .entries()
        .unwrap()
        .iter()
        .map(|e| e.run_index)
        .collect();
    assert_eq!(runs, (0..total).collect::<Vec<_>>());

    assert!(fx.ctrl.clear_audit_log().unwrap());
    assert!(!fx.ctrl.clear_audit_log().unwrap());
}

#[test]
fn working_config_keeps_unrelated_values() {
    let fx = fixture();
    fx.plan();
    runchain_core::mutator::ConfigMutator::new(fx.ctrl.layout())
        .apply(1)
        .unwrap();
    let text = std::fs::read_to_string(fx.ctrl.layout().working_config()).unwrap();
    let nml: Namelist = text.parse().unwrap();
    let tc = nml.group("time_control").unwrap();
    assert_eq!(tc.first("run_days"), Some(&Value::Int(1)));
    assert_eq!(tc.first("start_day"), Some(&Value::Int(2)));
    assert_eq!(tc.first("end_day"), Some(&Value::Int(3)));
}
