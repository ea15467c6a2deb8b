//! Dose schedule generation.
//!
//! Expands a medication's dosing plan (date range + doses per day) into the
//! concrete timestamps that become its `medication_schedules` rows.
//!
//! Placement policy: the first dose of every day is at 08:00 and the rest
//! follow at `24h / frequency` intervals. When that spacing would push the
//! last dose past the window's closing time (23:00 by default) the doses are
//! instead spread evenly between 08:00 and 23:00, so every dose stays on its
//! own calendar day. This is a reminder policy only; it does not model
//! pharmacological dosing intervals.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

use crate::config;
use crate::db::DATE_FORMAT;
use crate::models::{DoseEventDraft, Medication};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Time-of-day bounds for generated doses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DosingWindow {
    first_dose_secs: i64,
    last_dose_secs: i64,
}

impl DosingWindow {
    pub fn new(first_dose: NaiveTime, last_dose: NaiveTime) -> Result<Self, ScheduleError> {
        if last_dose < first_dose {
            return Err(ScheduleError::InvalidInput(format!(
                "dosing window closes ({last_dose}) before it opens ({first_dose})"
            )));
        }
        Ok(Self {
            first_dose_secs: i64::from(first_dose.num_seconds_from_midnight()),
            last_dose_secs: i64::from(last_dose.num_seconds_from_midnight()),
        })
    }

    pub fn first_dose(&self) -> NaiveTime {
        seconds_to_time(self.first_dose_secs)
    }

    pub fn last_dose(&self) -> NaiveTime {
        seconds_to_time(self.last_dose_secs)
    }

    /// Most doses per day the window can hold: one per minute of its span.
    pub fn max_frequency(&self) -> u32 {
        let minutes = (self.last_dose_secs - self.first_dose_secs) / 60;
        u32::try_from(minutes + 1).unwrap_or(u32::MAX)
    }

    /// Offsets (seconds after `first_dose`) of the doses of one day.
    fn daily_offsets(&self, frequency: u32) -> Vec<i64> {
        let f = i64::from(frequency);
        if f == 1 {
            return vec![0];
        }
        let span = self.last_dose_secs - self.first_dose_secs;
        let spills_over = (f - 1) * SECONDS_PER_DAY / f > span;
        (0..f)
            .map(|i| {
                if spills_over {
                    i * span / (f - 1)
                } else {
                    i * SECONDS_PER_DAY / f
                }
            })
            .collect()
    }
}

impl Default for DosingWindow {
    fn default() -> Self {
        Self {
            first_dose_secs: i64::from(config::FIRST_DOSE_HOUR) * 3600,
            last_dose_secs: i64::from(config::LAST_DOSE_HOUR) * 3600,
        }
    }
}

fn seconds_to_time(secs: i64) -> NaiveTime {
    u32::try_from(secs)
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0))
        .unwrap_or_default()
}

/// Generate dose timestamps with the default 08:00–23:00 window.
pub fn generate_dose_times(
    start: NaiveDate,
    end: NaiveDate,
    frequency: u32,
) -> Result<Vec<NaiveDateTime>, ScheduleError> {
    generate_dose_times_in(&DosingWindow::default(), start, end, frequency)
}

/// Generate `frequency` dose timestamps for every day in `[start, end]`,
/// ordered chronologically. An inverted range yields no doses.
pub fn generate_dose_times_in(
    window: &DosingWindow,
    start: NaiveDate,
    end: NaiveDate,
    frequency: u32,
) -> Result<Vec<NaiveDateTime>, ScheduleError> {
    if frequency < 1 {
        return Err(ScheduleError::InvalidInput(
            "frequency must be at least one dose per day".into(),
        ));
    }
    if frequency > window.max_frequency() {
        return Err(ScheduleError::InvalidInput(format!(
            "frequency {frequency} exceeds {} doses per day",
            window.max_frequency()
        )));
    }
    if start > end {
        return Ok(Vec::new());
    }

    let offsets = window.daily_offsets(frequency);
    let days = (end - start).num_days() + 1;
    let mut times = Vec::with_capacity(days as usize * offsets.len());

    for day in start.iter_days().take_while(|d| *d <= end) {
        let midnight = day.and_time(NaiveTime::default());
        for offset in &offsets {
            times.push(midnight + Duration::seconds(window.first_dose_secs + offset));
        }
    }

    Ok(times)
}

/// Parse a `YYYY-MM-DD` plan date; missing or malformed input is rejected.
pub fn parse_plan_date(raw: Option<&str>, field: &str) -> Result<NaiveDate, ScheduleError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScheduleError::InvalidInput(format!("{field} is required")))?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| ScheduleError::InvalidInput(format!("{field} '{raw}' is not a date: {e}")))
}

/// Same as [`generate_dose_times`], for dates straight from a form or row.
pub fn generate_dose_times_from_strings(
    start: Option<&str>,
    end: Option<&str>,
    frequency: u32,
) -> Result<Vec<NaiveDateTime>, ScheduleError> {
    let start = parse_plan_date(start, "start date")?;
    let end = parse_plan_date(end, "end date")?;
    generate_dose_times(start, end, frequency)
}

/// `start + duration_days`.
pub fn derive_end_date(start: NaiveDate, duration_days: u32) -> Result<NaiveDate, ScheduleError> {
    if duration_days < 1 {
        return Err(ScheduleError::InvalidInput(
            "duration must be at least one day".into(),
        ));
    }
    start
        .checked_add_signed(Duration::days(i64::from(duration_days)))
        .ok_or_else(|| ScheduleError::InvalidInput("end date out of range".into()))
}

/// Build the pending dose rows for a medication.
///
/// The medication runs for `duration_days` dosing days starting on
/// `start_date`; `end_date` (start + duration) is the first day without doses.
pub fn generate_schedule(med: &Medication) -> Result<Vec<DoseEventDraft>, ScheduleError> {
    if med.duration_days < 1 {
        return Err(ScheduleError::InvalidInput(
            "duration must be at least one day".into(),
        ));
    }
    let last_dosing_day = med
        .end_date
        .pred_opt()
        .ok_or_else(|| ScheduleError::InvalidInput("end date out of range".into()))?;

    let drafts = generate_dose_times(med.start_date, last_dosing_day, med.frequency)?
        .into_iter()
        .map(|scheduled_time| DoseEventDraft {
            scheduled_time,
            is_taken: false,
        })
        .collect();
    Ok(drafts)
}
