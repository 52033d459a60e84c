//! Rewrites the working namelist for the run about to be submitted.

use tracing::info;

use crate::error::{Result, RunChainError};
use crate::model::{RunPlan, RunWindow};
use crate::namelist::Value;
use crate::store::{self, Layout};
use crate::time_control::{self, END_FIELDS, RESTART_KEY, START_FIELDS, TIME_CONTROL_GROUP};

/// Writes the working configuration for a given run.
#[derive(Debug, Clone, Copy)]
pub struct ConfigMutator<'a> {
    layout: &'a Layout,
}

impl<'a> ConfigMutator<'a> {
    /// Mutator over the files in `layout`.
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    /// Loads the persisted plan and applies run `run_index`.
    pub fn apply(&self, run_index: usize) -> Result<RunWindow> {
        let plan: RunPlan = store::read_json(self.layout.metadata())?
            .ok_or_else(|| RunChainError::PlanNotFound(self.layout.metadata().to_path_buf()))?;
        self.apply_with(&plan, run_index)
    }

    /// Applies run `run_index` of `plan`.
    ///
    /// Always starts from the source namelist, never from a previous working
    /// copy, so repeated calls for the same run produce identical output.
    pub fn apply_with(&self, plan: &RunPlan, run_index: usize) -> Result<RunWindow> {
        let source = self.layout.source_config();
        let mut nml = time_control::load_namelist(source)?;
        let window = plan.window(run_index).ok_or_else(|| RunChainError::CorruptState {
            path: self.layout.metadata().to_path_buf(),
            reason: format!("run {} lies outside the representable calendar", run_index + 1),
        })?;

        let group = nml
            .group_mut(TIME_CONTROL_GROUP)
            .ok_or_else(|| RunChainError::ConfigMalformed {
                path: source.to_path_buf(),
                reason: format!("missing &{TIME_CONTROL_GROUP} group"),
            })?;
        time_control::set_datetime(group, &START_FIELDS, window.start);
        time_control::set_datetime(group, &END_FIELDS, window.end);
        group.set_first(RESTART_KEY, Value::Bool(window.restart));

        store::write_atomic(self.layout.working_config(), nml.to_string().as_bytes())?;
        info!(
            run = run_index + 1,
            start = %window.start,
            end = %window.end,
            restart = window.restart,
            "working configuration updated"
        );
        Ok(window)
    }
}
