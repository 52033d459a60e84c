use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use runchain_core::{ChainConfig, Controller};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod prompt;
mod report;
mod slurm;

use prompt::TerminalConfirm;
use slurm::Slurm;

#[derive(Debug, Parser)]
#[command(
    name = "runchainctl",
    version,
    about = "Split a long simulation into a chain of Slurm jobs and submit them one at a time"
)]
struct Cli {
    /// Working directory holding the namelists, plan, lock and outputs.
    #[arg(long, global = true, default_value = ".")]
    work_dir: PathBuf,

    /// Batch script to submit, overriding `submit_script` from the config file.
    #[arg(long, global = true)]
    sbatch_script: Option<PathBuf>,

    /// Settings file. Defaults to runchain.toml in the working directory, if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter in tracing env-filter syntax. Falls back to RUST_LOG, then "info".
    #[arg(long, global = true)]
    log: Option<String>,

    /// Answer yes to every confirmation prompt.
    #[arg(long, short = 'y', global = true, default_value_t = false)]
    yes: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Compute the run plan from the source namelist.
    GenMeta {
        /// Overwrite an existing plan without asking.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Submit the next run unless one is in flight or all are done.
    Submit,
    /// Show progress and lock state.
    Check,
    /// Remove the lock file after confirmation.
    Unlock,
    /// Remove the lock file without asking.
    ForceUnlock,
    /// Cancel the locked job and remove the lock.
    CancelJob,
    /// Cancel any job and delete the run plan.
    Reset,
    /// Delete the submission record.
    ClearRecord,
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    let work_dir = std::fs::canonicalize(&cli.work_dir)
        .with_context(|| format!("working directory {}", cli.work_dir.display()))?;
    let mut config = ChainConfig::discover(&work_dir, cli.config.as_deref())?;
    if let Some(script) = cli.sbatch_script {
        config.submit_script = script;
    }
    debug!(work_dir = %work_dir.display(), ?config, "configuration resolved");

    let ctrl = Controller::new(work_dir, config, Slurm::default());
    let mut confirm = TerminalConfirm { assume_yes: cli.yes };

    let text = match cli.cmd {
        Cmd::GenMeta { force } => report::plan(&ctrl.generate_plan(force, &mut confirm)?),
        Cmd::Submit => report::advance(&ctrl.advance().await?),
        Cmd::Check => report::status(&ctrl.status(&mut confirm).await?),
        Cmd::Unlock => report::release(&ctrl.release_lock(false, &mut confirm)?),
        Cmd::ForceUnlock => report::release(&ctrl.release_lock(true, &mut confirm)?),
        Cmd::CancelJob => report::cancel(&ctrl.cancel().await?),
        Cmd::Reset => report::reset(&ctrl.reset().await?),
        Cmd::ClearRecord => report::clear_record(ctrl.clear_audit_log()?),
    };
    println!("{text}");
    Ok(())
}
