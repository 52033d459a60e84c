//! Slurm backend: `sbatch`, `squeue` and `scancel` driven through
//! `tokio::process`.

use std::io;
use std::path::Path;
use std::process::Output;

use runchain_core::scheduler::parse_submission_response;
use runchain_core::{Scheduler, SchedulerError};
use tokio::process::Command;
use tracing::debug;

/// Talks to Slurm through its command-line tools.
#[derive(Debug, Clone)]
pub struct Slurm {
    sbatch: String,
    squeue: String,
    scancel: String,
}

impl Default for Slurm {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".into(),
            squeue: "squeue".into(),
            scancel: "scancel".into(),
        }
    }
}

impl Slurm {
    async fn run(&self, program: &str, cmd: &mut Command) -> Result<Output, SchedulerError> {
        debug!(program, "running scheduler command");
        let out = cmd.kill_on_drop(true).output().await.map_err(|e| spawn_error(program, e))?;
        if out.status.success() {
            Ok(out)
        } else {
            Err(SchedulerError::CommandFailed {
                program: program.to_string(),
                detail: failure_detail(&out),
            })
        }
    }
}

impl Scheduler for Slurm {
    async fn submit(&self, script: &Path, work_dir: &Path) -> Result<String, SchedulerError> {
        let out = self
            .run(&self.sbatch, Command::new(&self.sbatch).arg(script).current_dir(work_dir))
            .await?;
        parse_submission_response(&String::from_utf8_lossy(&out.stdout))
    }

    async fn is_live(&self, job_id: &str) -> Result<bool, SchedulerError> {
        match self.run(&self.squeue, Command::new(&self.squeue).args(["-h", "-j", job_id])).await {
            Ok(out) => Ok(queue_lists_job(&String::from_utf8_lossy(&out.stdout))),
            // squeue exits non-zero for ids that have aged out of the controller.
            Err(SchedulerError::CommandFailed { detail, .. }) if is_unknown_job(&detail) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.run(&self.scancel, Command::new(&self.scancel).arg(job_id)).await?;
        Ok(())
    }
}

fn spawn_error(program: &str, e: io::Error) -> SchedulerError {
    if e.kind() == io::ErrorKind::NotFound {
        SchedulerError::Unavailable(program.to_string())
    } else {
        SchedulerError::CommandFailed {
            program: program.to_string(),
            detail: e.to_string(),
        }
    }
}

fn failure_detail(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit status {}", out.status)
    } else {
        stderr.to_string()
    }
}

fn queue_lists_job(stdout: &str) -> bool {
    stdout.lines().any(|l| !l.trim().is_empty())
}

fn is_unknown_job(detail: &str) -> bool {
    detail.contains("Invalid job id")
}
