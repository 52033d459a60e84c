//! Progress derived from artifacts on disk.
//!
//! No progress counter is stored. The first run whose artifacts are not all
//! present is the next run to submit.

use std::path::Path;

use crate::model::RunPlan;

/// Index of the first run with a missing artifact, or `total_runs` when every
/// run is complete.
pub fn current_run_index(plan: &RunPlan, root: &Path) -> usize {
    plan.expected_artifacts
        .iter()
        .position(|names| !names.iter().all(|name| root.join(name).exists()))
        .unwrap_or(plan.total_runs)
}

/// Artifacts of `run_index` not yet present under `root`.
pub fn missing_artifacts<'a>(plan: &'a RunPlan, root: &Path, run_index: usize) -> Vec<&'a str> {
    plan.expected_artifacts
        .get(run_index)
        .map(|names| {
            names
                .iter()
                .filter(|name| !root.join(name).exists())
                .map(String::as_str)
                .collect()
        })
        .unwrap_or_default()
}
