//! Typed view over the `&time_control` fields the controller plans from.

use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Result, RunChainError};
use crate::namelist::{Group, Namelist, Value};

/// Namelist group holding the time window.
pub const TIME_CONTROL_GROUP: &str = "time_control";

/// Restart toggle in `&time_control`.
pub const RESTART_KEY: &str = "restart";

/// Start time fields, year first.
pub const START_FIELDS: [&str; 6] = [
    "start_year",
    "start_month",
    "start_day",
    "start_hour",
    "start_minute",
    "start_second",
];

/// End time fields, year first.
pub const END_FIELDS: [&str; 6] = [
    "end_year",
    "end_month",
    "end_day",
    "end_hour",
    "end_minute",
    "end_second",
];

/// Run length components with the number of seconds in each unit.
const RUN_LENGTH_FIELDS: [(&str, i64); 4] = [
    ("run_days", 86_400),
    ("run_hours", 3_600),
    ("run_minutes", 60),
    ("run_seconds", 1),
];

/// Time-control fields needed for planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeControl {
    /// Simulation start.
    pub start: NaiveDateTime,
    /// Simulation end.
    pub end: NaiveDateTime,
    /// Sum of the `run_*` components; may be zero or negative, the planner
    /// rejects that.
    pub run_length_seconds: i64,
}

/// Reads and parses a namelist file.
///
/// Absent file is [`RunChainError::ConfigNotFound`]; a syntax error is
/// [`RunChainError::ConfigMalformed`].
pub fn load_namelist(path: &Path) -> Result<Namelist> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            RunChainError::ConfigNotFound(path.to_path_buf())
        } else {
            RunChainError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    text.parse::<Namelist>().map_err(|e| RunChainError::ConfigMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Reads the time window from the source namelist at `path`.
pub fn read_time_control(path: &Path) -> Result<TimeControl> {
    let nml = load_namelist(path)?;
    TimeControl::from_namelist(&nml).map_err(|reason| RunChainError::ConfigMalformed {
        path: path.to_path_buf(),
        reason,
    })
}

impl TimeControl {
    /// Extracts and validates the time fields. The error is a human-readable
    /// reason.
    pub fn from_namelist(nml: &Namelist) -> std::result::Result<Self, String> {
        let group = nml
            .group(TIME_CONTROL_GROUP)
            .ok_or_else(|| format!("missing &{TIME_CONTROL_GROUP} group"))?;

        let start = datetime(group, &START_FIELDS)?;
        let end = datetime(group, &END_FIELDS)?;

        let mut run_length_seconds: i64 = 0;
        for (key, unit) in RUN_LENGTH_FIELDS {
            let amount = match group.first(key) {
                None => 0,
                Some(v) => v.as_int().ok_or_else(|| format!("{key} must be an integer, got {v}"))?,
            };
            run_length_seconds = amount
                .checked_mul(unit)
                .and_then(|s| run_length_seconds.checked_add(s))
                .ok_or_else(|| format!("{key} is out of range"))?;
        }

        Ok(Self {
            start,
            end,
            run_length_seconds,
        })
    }
}

fn datetime(group: &Group, fields: &[&str; 6]) -> std::result::Result<NaiveDateTime, String> {
    let mut parts = [0i64; 6];
    for (slot, key) in parts.iter_mut().zip(fields) {
        let value = group.first(key).ok_or_else(|| format!("missing required field {key}"))?;
        *slot = value
            .as_int()
            .ok_or_else(|| format!("{key} must be an integer, got {value}"))?;
    }
    let [year, month, day, hour, minute, second] = parts;
    let narrow = |v: i64, key: &str| u32::try_from(v).map_err(|_| format!("{key} out of range: {v}"));
    let year = i32::try_from(year).map_err(|_| format!("{} out of range: {year}", fields[0]))?;
    NaiveDate::from_ymd_opt(year, narrow(month, fields[1])?, narrow(day, fields[2])?)
        .and_then(|d| {
            d.and_hms_opt(
                narrow(hour, fields[3]).ok()?,
                narrow(minute, fields[4]).ok()?,
                narrow(second, fields[5]).ok()?,
            )
        })
        .ok_or_else(|| {
            format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} is not a valid date-time"
            )
        })
}

/// Writes `t` into the first column of the six `fields` of `group`.
pub(crate) fn set_datetime(group: &mut Group, fields: &[&str; 6], t: NaiveDateTime) {
    let parts = [
        i64::from(t.year()),
        i64::from(t.month()),
        i64::from(t.day()),
        i64::from(t.hour()),
        i64::from(t.minute()),
        i64::from(t.second()),
    ];
    for (key, v) in fields.iter().zip(parts) {
        group.set_first(key, Value::Int(v));
    }
}
