#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Run-sequencing controller for simulations that are split into a chain of
//! consecutive batch jobs.
//!
//! All state lives on disk inside one working directory: the run plan, the
//! lock naming the job currently in flight, the audit log, and the output
//! artifacts the simulation writes. Every invocation re-derives progress from
//! those files, so the controller can be run again after any crash.

pub mod audit;
pub mod config;
pub mod confirm;
pub mod controller;
pub mod error;
pub mod lock;
pub mod model;
pub mod mutator;
pub mod namelist;
pub mod plan;
pub mod progress;
pub mod scheduler;
pub mod store;
pub mod time_control;

mod util;

pub use config::{ChainConfig, LivenessFailure};
pub use confirm::Confirm;
pub use controller::{
    AdvanceOutcome, CancelOutcome, Controller, PlanOutcome, PlanSummary, ResetOutcome,
    StatusReport,
};
pub use error::{Result, RunChainError};
pub use lock::{Liveness, LockManager, Reconciliation, ReleaseOutcome};
pub use model::{AuditEntry, LockRecord, RunPlan, RunWindow};
pub use scheduler::{Scheduler, SchedulerError};
pub use store::Layout;
pub use util::now_utc;
