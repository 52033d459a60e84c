//! Run plan calculation: how many runs, and what each one must produce.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::error::{Result, RunChainError};
use crate::model::RunPlan;
use crate::time_control::TimeControl;

/// Timestamp layout used in artifact names, e.g. `2024-01-02_00:00:00`.
pub const ARTIFACT_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Naming convention for the files a run leaves behind.
///
/// Each run expects `{prefix}_{domain}_{timestamp}` for every prefix and
/// domain, keyed on the run's completion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNaming {
    /// File prefixes, e.g. `wrfout`.
    pub prefixes: Vec<String>,
    /// Domain ids, e.g. `d01`.
    pub domains: Vec<String>,
}

impl Default for ArtifactNaming {
    fn default() -> Self {
        Self {
            prefixes: vec!["wrfout".into(), "wrfrst".into()],
            domains: vec!["d01".into()],
        }
    }
}

impl ArtifactNaming {
    /// Artifact names for a run completing at `completed_at`.
    pub fn names_at(&self, completed_at: NaiveDateTime) -> Vec<String> {
        let stamp = completed_at.format(ARTIFACT_TIME_FORMAT).to_string();
        let stamp = stamp.as_str();
        self.domains
            .iter()
            .flat_map(|domain| {
                self.prefixes
                    .iter()
                    .map(move |prefix| format!("{prefix}_{domain}_{stamp}"))
            })
            .collect()
    }
}

/// `ceil(span / run)` for a positive run length, rejecting counts below 1.
pub fn total_runs(span_seconds: i64, run_seconds: i64) -> Result<usize> {
    if run_seconds <= 0 {
        return Err(RunChainError::DegenerateRunLength {
            seconds: run_seconds,
        });
    }
    // Integer division truncates toward zero, which is already the ceiling
    // for negative spans.
    let runs = span_seconds / run_seconds + i64::from(span_seconds % run_seconds > 0);
    if runs <= 0 {
        return Err(RunChainError::NonPositiveRunCount { runs });
    }
    usize::try_from(runs).map_err(|_| RunChainError::NonPositiveRunCount { runs })
}

impl RunPlan {
    /// Computes the plan for `tc`.
    ///
    /// Nothing is written; callers persist the result.
    pub fn build(tc: &TimeControl, naming: &ArtifactNaming, created_at: DateTime<Utc>) -> Result<Self> {
        if tc.run_length_seconds <= 0 {
            return Err(RunChainError::DegenerateRunLength {
                seconds: tc.run_length_seconds,
            });
        }
        let span = (tc.end - tc.start).num_seconds();
        let total = total_runs(span, tc.run_length_seconds)?;

        let out_of_range = || RunChainError::DegenerateRunLength {
            seconds: tc.run_length_seconds,
        };
        let run_length = TimeDelta::try_seconds(tc.run_length_seconds).ok_or_else(out_of_range)?;
        let mut expected_artifacts = Vec::new();
        let mut completed_at = tc.start;
        for _ in 0..total {
            completed_at = completed_at
                .checked_add_signed(run_length)
                .ok_or_else(out_of_range)?;
            expected_artifacts.push(naming.names_at(completed_at));
        }

        Ok(Self {
            total_runs: total,
            start_time: tc.start,
            end_time: tc.end,
            run_duration_seconds: tc.run_length_seconds,
            expected_artifacts,
            created_at,
        })
    }

    /// Checks the invariants a persisted plan must satisfy.
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.total_runs == 0 {
            return Err("total_runs must be at least 1".into());
        }
        if self.run_duration_seconds <= 0 {
            return Err("run_duration_seconds must be positive".into());
        }
        if self.window(self.total_runs - 1).is_none() {
            return Err("last run ends outside the representable calendar".into());
        }
        if self.expected_artifacts.len() != self.total_runs {
            return Err(format!(
                "expected_artifacts has {} entries for {} runs",
                self.expected_artifacts.len(),
                self.total_runs
            ));
        }
        Ok(())
    }
}
