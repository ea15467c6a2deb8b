//! Compliance aggregation over dose events and consumption logs.
//!
//! Everything here is pure: callers fetch and window the rows, these
//! functions only count. Late doses are non-compliant but stay in the
//! denominator; an empty input means nothing was missed (100%).

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::enums::ConsumptionStatus;
use crate::models::{ConsumptionLog, ScheduleEvent, ScheduledDose};

/// Anything that can be judged taken / not taken.
pub trait DoseOutcome {
    fn is_taken(&self) -> bool;
}

/// Anything anchored to a scheduled instant (for per-day series).
pub trait Scheduled {
    fn scheduled_at(&self) -> NaiveDateTime;
}

impl DoseOutcome for bool {
    fn is_taken(&self) -> bool {
        *self
    }
}

impl DoseOutcome for ConsumptionStatus {
    fn is_taken(&self) -> bool {
        matches!(self, ConsumptionStatus::Taken)
    }
}

impl DoseOutcome for ScheduleEvent {
    fn is_taken(&self) -> bool {
        self.is_taken
    }
}

impl DoseOutcome for ConsumptionLog {
    fn is_taken(&self) -> bool {
        self.status.is_taken()
    }
}

impl DoseOutcome for ScheduledDose {
    fn is_taken(&self) -> bool {
        self.event.is_taken
    }
}

impl<T: DoseOutcome + ?Sized> DoseOutcome for &T {
    fn is_taken(&self) -> bool {
        (**self).is_taken()
    }
}

impl Scheduled for ScheduleEvent {
    fn scheduled_at(&self) -> NaiveDateTime {
        self.scheduled_time
    }
}

impl Scheduled for ConsumptionLog {
    fn scheduled_at(&self) -> NaiveDateTime {
        self.scheduled_time
    }
}

impl Scheduled for ScheduledDose {
    fn scheduled_at(&self) -> NaiveDateTime {
        self.event.scheduled_time
    }
}

impl<T: Scheduled + ?Sized> Scheduled for &T {
    fn scheduled_at(&self) -> NaiveDateTime {
        (**self).scheduled_at()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    pub total: u32,
    pub taken: u32,
    pub missed: u32,
    /// 0..=100, rounded half up.
    pub compliance_percentage: u32,
}

impl ComplianceSnapshot {
    pub fn from_counts(total: u32, taken: u32) -> Self {
        let taken = taken.min(total);
        Self {
            total,
            taken,
            missed: total - taken,
            compliance_percentage: percentage(taken, total),
        }
    }
}

impl Default for ComplianceSnapshot {
    fn default() -> Self {
        Self::from_counts(0, 0)
    }
}

fn percentage(taken: u32, total: u32) -> u32 {
    if total == 0 {
        return 100;
    }
    let (taken, total) = (u64::from(taken), u64::from(total));
    ((taken * 200 + total) / (total * 2)) as u32
}

/// Reduce records to a compliance snapshot.
pub fn aggregate<I>(records: I) -> ComplianceSnapshot
where
    I: IntoIterator,
    I::Item: DoseOutcome,
{
    let (total, taken) = records.into_iter().fold((0u32, 0u32), |(total, taken), r| {
        (total + 1, taken + u32::from(r.is_taken()))
    });
    ComplianceSnapshot::from_counts(total, taken)
}

/// Per-status counts for consumption log reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub taken: u32,
    pub late: u32,
    pub missed: u32,
}

pub fn status_breakdown<I>(statuses: I) -> StatusBreakdown
where
    I: IntoIterator<Item = ConsumptionStatus>,
{
    statuses
        .into_iter()
        .fold(StatusBreakdown::default(), |mut acc, status| {
            match status {
                ConsumptionStatus::Taken => acc.taken += 1,
                ConsumptionStatus::Late => acc.late += 1,
                ConsumptionStatus::Missed => acc.missed += 1,
            }
            acc
        })
}

/// Date window callers use to pre-filter records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceWindow {
    Today,
    /// The last `n` calendar days, today included.
    LastDays(u32),
    Range { from: NaiveDate, to: NaiveDate },
}

impl ComplianceWindow {
    /// Inclusive date bounds relative to `today`.
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            Self::Today => (today, today),
            Self::LastDays(n) => {
                let back = i64::from(n.max(1)) - 1;
                let from = today
                    .checked_sub_signed(Duration::days(back))
                    .unwrap_or(NaiveDate::MIN);
                (from, today)
            }
            Self::Range { from, to } => (from, to),
        }
    }

    pub fn contains(&self, ts: &NaiveDateTime, today: NaiveDate) -> bool {
        let (from, to) = self.bounds(today);
        let date = ts.date();
        date >= from && date <= to
    }

    /// Keep the records whose scheduled instant falls inside the window.
    pub fn select<'a, T: Scheduled>(&self, records: &'a [T], today: NaiveDate) -> Vec<&'a T> {
        records
            .iter()
            .filter(|r| self.contains(&r.scheduled_at(), today))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCompliance {
    pub date: NaiveDate,
    pub snapshot: ComplianceSnapshot,
}

/// One entry per day of `[from, to]`; days without records report 100%.
pub fn daily_series<T>(records: &[T], from: NaiveDate, to: NaiveDate) -> Vec<DailyCompliance>
where
    T: DoseOutcome + Scheduled,
{
    let mut counts: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
    for record in records {
        let date = record.scheduled_at().date();
        if date < from || date > to {
            continue;
        }
        let entry = counts.entry(date).or_default();
        entry.0 += 1;
        entry.1 += u32::from(record.is_taken());
    }

    from.iter_days()
        .take_while(|d| *d <= to)
        .map(|date| {
            let (total, taken) = counts.get(&date).copied().unwrap_or_default();
            DailyCompliance {
                date,
                snapshot: ComplianceSnapshot::from_counts(total, taken),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCompliance {
    pub year: i32,
    pub month: u32,
    pub snapshot: ComplianceSnapshot,
}

/// The last `months` calendar months ending with `today`'s, oldest first.
pub fn monthly_series<T>(records: &[T], months: u32, today: NaiveDate) -> Vec<MonthlyCompliance>
where
    T: DoseOutcome + Scheduled,
{
    let mut keys = Vec::with_capacity(months as usize);
    let (mut year, mut month) = (today.year(), today.month());
    for _ in 0..months {
        keys.push((year, month));
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    keys.reverse();

    let mut counts: BTreeMap<(i32, u32), (u32, u32)> =
        keys.iter().map(|k| (*k, (0, 0))).collect();
    for record in records {
        let at = record.scheduled_at();
        if let Some(entry) = counts.get_mut(&(at.year(), at.month())) {
            entry.0 += 1;
            entry.1 += u32::from(record.is_taken());
        }
    }

    counts
        .into_iter()
        .map(|((year, month), (total, taken))| MonthlyCompliance {
            year,
            month,
            snapshot: ComplianceSnapshot::from_counts(total, taken),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(at: NaiveDateTime, taken: bool) -> ScheduleEvent {
        ScheduleEvent {
            id: Uuid::new_v4(),
            medication_id: Uuid::nil(),
            scheduled_time: at,
            is_taken: taken,
            taken_at: taken.then_some(at),
            notes: None,
            created_at: at,
        }
    }

    fn log(status: ConsumptionStatus) -> ConsumptionLog {
        let at = date(2024, 1, 1).and_hms_opt(8, 0, 0).unwrap();
        ConsumptionLog {
            id: Uuid::new_v4(),
            patient_id: Uuid::nil(),
            medication_id: Uuid::nil(),
            schedule_id: None,
            scheduled_time: at,
            actual_time: None,
            status,
            notes: None,
            created_at: at,
        }
    }

    #[test]
    fn half_taken_is_fifty_percent() {
        let snap = aggregate([true, true, false, false]);
        assert_eq!(
            snap,
            ComplianceSnapshot { total: 4, taken: 2, missed: 2, compliance_percentage: 50 }
        );
    }

    #[test]
    fn empty_is_fully_compliant() {
        let snap = aggregate(Vec::<bool>::new());
        assert_eq!(
            snap,
            ComplianceSnapshot { total: 0, taken: 0, missed: 0, compliance_percentage: 100 }
        );
        assert_eq!(ComplianceSnapshot::default(), snap);
    }

    #[test]
    fn rounds_half_up() {
        // 1/8 = 12.5% -> 13
        assert_eq!(aggregate([true, false, false, false, false, false, false, false]).compliance_percentage, 13);
        // 2/3 = 66.67% -> 67
        assert_eq!(aggregate([true, true, false]).compliance_percentage, 67);
        // 1/3 = 33.33% -> 33
        assert_eq!(aggregate([true, false, false]).compliance_percentage, 33);
    }

    #[test]
    fn taken_plus_missed_is_total() {
        let mut records = Vec::new();
        for i in 0..37 {
            records.push(i % 3 == 0);
            let snap = aggregate(&records);
            assert_eq!(snap.taken + snap.missed, snap.total);
            assert!(snap.compliance_percentage <= 100);
        }
    }

    #[test]
    fn aggregate_is_idempotent() {
        let records = vec![true, false, true, true, false];
        assert_eq!(aggregate(&records), aggregate(&records));
    }

    #[test]
    fn late_counts_against_compliance() {
        let logs = vec![
            log(ConsumptionStatus::Taken),
            log(ConsumptionStatus::Late),
            log(ConsumptionStatus::Missed),
            log(ConsumptionStatus::Taken),
        ];
        let snap = aggregate(&logs);
        assert_eq!(snap.total, 4);
        assert_eq!(snap.taken, 2);
        assert_eq!(snap.compliance_percentage, 50);
    }

    #[test]
    fn breakdown_separates_late() {
        let b = status_breakdown([
            ConsumptionStatus::Taken,
            ConsumptionStatus::Late,
            ConsumptionStatus::Late,
            ConsumptionStatus::Missed,
        ]);
        assert_eq!(b, StatusBreakdown { taken: 1, late: 2, missed: 1 });
    }

    #[test]
    fn schedule_events_aggregate() {
        let at = date(2024, 1, 1).and_hms_opt(8, 0, 0).unwrap();
        let events = vec![event(at, true), event(at, false), event(at, true)];
        assert_eq!(aggregate(&events).compliance_percentage, 67);
    }

    #[test]
    fn window_bounds() {
        let today = date(2024, 3, 10);
        assert_eq!(ComplianceWindow::Today.bounds(today), (today, today));
        assert_eq!(ComplianceWindow::LastDays(7).bounds(today), (date(2024, 3, 4), today));
        assert_eq!(ComplianceWindow::LastDays(0).bounds(today), (today, today));
    }

    #[test]
    fn huge_window_clamps_to_earliest_date() {
        let today = date(2024, 3, 10);
        let window = ComplianceWindow::LastDays(u32::MAX);
        assert_eq!(window.bounds(today), (NaiveDate::MIN, today));
        let at = date(2000, 1, 1).and_hms_opt(8, 0, 0).unwrap();
        assert!(window.contains(&at, today));
    }

    #[test]
    fn window_select_filters_by_day() {
        let today = date(2024, 3, 10);
        let events = vec![
            event(date(2024, 3, 10).and_hms_opt(8, 0, 0).unwrap(), true),
            event(date(2024, 3, 10).and_hms_opt(20, 0, 0).unwrap(), false),
            event(date(2024, 3, 9).and_hms_opt(20, 0, 0).unwrap(), false),
        ];
        let todays = ComplianceWindow::Today.select(&events, today);
        assert_eq!(todays.len(), 2);
        assert_eq!(aggregate(todays).compliance_percentage, 50);
    }

    #[test]
    fn daily_series_covers_every_day() {
        let events = vec![
            event(date(2024, 1, 1).and_hms_opt(8, 0, 0).unwrap(), true),
            event(date(2024, 1, 1).and_hms_opt(20, 0, 0).unwrap(), false),
            event(date(2024, 1, 3).and_hms_opt(8, 0, 0).unwrap(), true),
            event(date(2024, 1, 9).and_hms_opt(8, 0, 0).unwrap(), false),
        ];
        let series = daily_series(&events, date(2024, 1, 1), date(2024, 1, 3));
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].snapshot.compliance_percentage, 50);
        assert_eq!(series[1].snapshot.total, 0);
        assert_eq!(series[1].snapshot.compliance_percentage, 100);
        assert_eq!(series[2].snapshot.taken, 1);
    }

    #[test]
    fn monthly_series_wraps_year() {
        let events = vec![
            event(date(2023, 12, 5).and_hms_opt(8, 0, 0).unwrap(), false),
            event(date(2024, 2, 5).and_hms_opt(8, 0, 0).unwrap(), true),
            event(date(2023, 6, 5).and_hms_opt(8, 0, 0).unwrap(), true),
        ];
        let series = monthly_series(&events, 3, date(2024, 2, 20));
        let months: Vec<(i32, u32)> = series.iter().map(|m| (m.year, m.month)).collect();
        assert_eq!(months, vec![(2023, 12), (2024, 1), (2024, 2)]);
        assert_eq!(series[0].snapshot.compliance_percentage, 0);
        assert_eq!(series[1].snapshot.total, 0);
        assert_eq!(series[2].snapshot.compliance_percentage, 100);
    }

    #[test]
    fn snapshot_serializes_for_charts() {
        let json = serde_json::to_value(aggregate([true, false])).unwrap();
        assert_eq!(json["compliance_percentage"], 50);
        assert_eq!(json["missed"], 1);
    }
}
