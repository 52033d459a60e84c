//! Operator-facing text for each command outcome. Written to stdout.

use std::fmt::Write;

use runchain_core::{
    AdvanceOutcome, CancelOutcome, Liveness, LockRecord, PlanOutcome, Reconciliation, ReleaseOutcome,
    ResetOutcome, RunPlan, StatusReport,
};

pub fn plan(outcome: &PlanOutcome) -> String {
    match outcome {
        PlanOutcome::Kept => "Kept existing run plan.".into(),
        PlanOutcome::Created(plan) => plan_created(plan),
    }
}

fn plan_created(plan: &RunPlan) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Run plan written.");
    let _ = writeln!(s, "  Simulation: {} -> {}", plan.start_time, plan.end_time);
    let _ = writeln!(s, "  Run length: {}s", plan.run_duration_seconds);
    let _ = write!(s, "  Total runs: {}", plan.total_runs);
    s
}

pub fn advance(outcome: &AdvanceOutcome) -> String {
    match outcome {
        AdvanceOutcome::InProgress(lock) => format!(
            "Job {} (run {}) is still in progress; nothing submitted.",
            lock.external_job_id,
            lock.run_index + 1
        ),
        AdvanceOutcome::Complete { total_runs } => {
            format!("All {total_runs} runs completed.")
        }
        AdvanceOutcome::Submitted {
            run_index,
            total_runs,
            job_id,
        } => format!("Submitted run {}/{} as job {}.", run_index + 1, total_runs, job_id),
    }
}

pub fn status(report: &StatusReport) -> String {
    let mut s = String::new();
    let total = match &report.plan {
        None => {
            let _ = writeln!(s, "No run plan found; run `gen-meta` first.");
            None
        }
        Some(p) => {
            let _ = writeln!(s, "Simulation: {} -> {}", p.start_time, p.end_time);
            let _ = writeln!(s, "Progress:   {}/{} runs completed", p.completed_runs, p.total_runs);
            Some((p.completed_runs, p.total_runs))
        }
    };

    match &report.lock {
        Reconciliation::Held { record, liveness } => {
            let state = match liveness {
                Liveness::Unknown(reason) => format!("UNKNOWN ({reason}); treated as running"),
                _ => "RUNNING".into(),
            };
            let _ = writeln!(s, "Job:        {state}");
            lock_details(&mut s, record, total.map(|(_, n)| n));
        }
        Reconciliation::Stale { record, liveness } => {
            let state = match liveness {
                Liveness::Unknown(reason) => format!("UNKNOWN ({reason}); treated as finished"),
                _ => "NOT RUNNING".into(),
            };
            let _ = writeln!(s, "Job:        {state} (stale lock)");
            lock_details(&mut s, record, total.map(|(_, n)| n));
            if report.stale_lock_removed {
                let _ = writeln!(s, "Stale lock removed.");
            } else {
                let _ = writeln!(s, "Stale lock kept.");
            }
        }
        Reconciliation::Unlocked => match total {
            Some((done, n)) if done >= n => {
                let _ = writeln!(s, "Job:        none; all runs completed");
            }
            Some((done, n)) => {
                let _ = writeln!(s, "Job:        none; ready to submit run {}/{}", done + 1, n);
            }
            None => {
                let _ = writeln!(s, "Job:        none");
            }
        },
    }
    s.trim_end().to_string()
}

fn lock_details(s: &mut String, record: &LockRecord, total_runs: Option<usize>) {
    let run = match total_runs {
        Some(n) => format!("{}/{}", record.run_index + 1, n),
        None => (record.run_index + 1).to_string(),
    };
    let _ = writeln!(s, "  Job ID:   {}", record.external_job_id);
    let _ = writeln!(s, "  Run:      {run}");
    let _ = writeln!(s, "  Acquired: {}", record.acquired_at.to_rfc3339());
}

pub fn release(outcome: &ReleaseOutcome) -> String {
    match outcome {
        ReleaseOutcome::NoLock => "No lock file.".into(),
        ReleaseOutcome::Declined => "Lock kept.".into(),
        ReleaseOutcome::Released(r) => format!("Lock for job {} removed.", r.external_job_id),
    }
}

pub fn cancel(outcome: &CancelOutcome) -> String {
    match outcome {
        CancelOutcome::NoLock => "No lock file; no job to cancel.".into(),
        CancelOutcome::Cancelled(r) => format!("Job {} cancelled; lock removed.", r.external_job_id),
        CancelOutcome::ReleasedStale(r) => {
            format!("Job {} was not running; lock removed.", r.external_job_id)
        }
    }
}

pub fn reset(outcome: &ResetOutcome) -> String {
    let plan = if outcome.plan_removed {
        "Run plan removed."
    } else {
        "No run plan to remove."
    };
    let job = match &outcome.cancel {
        Ok(c) => cancel(c),
        Err(reason) => format!("Warning: {reason}; lock kept."),
    };
    format!("{job}\n{plan}")
}

pub fn clear_record(existed: bool) -> String {
    if existed {
        "Submission record removed.".into()
    } else {
        "No submission record.".into()
    }
}
