//! Role dashboards and analytics, aggregated from persisted rows.
//!
//! Schedule-based figures only count doses scheduled up to `now`, so doses
//! still ahead today do not drag compliance down.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::compliance::{self, ComplianceSnapshot, ComplianceWindow, DailyCompliance, MonthlyCompliance};
use crate::config;
use crate::db::repository;
use crate::doses::{day_filter, todays_schedule};
use crate::error::ServiceError;
use crate::models::{ConsumptionLog, MedicationFilter, ScheduleEvent, ScheduledDose};
use crate::session::ViewPolicy;

const WEEK_DAYS: u32 = 7;
const TREND_MONTHS: u32 = 6;

// ═══════════════════════════════════════════
// View types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub total_patients: u32,
    pub active_medications: u32,
    pub todays_schedules: u32,
    /// Over consumption logs of the last 30 days.
    pub compliance: ComplianceSnapshot,
    pub weekly: Vec<DailyCompliance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorDashboard {
    pub my_patients: u32,
    pub active_medications: u32,
    pub todays_schedules: u32,
    pub compliance: ComplianceSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    pub todays_medications: u32,
    pub completed: u32,
    pub missed: u32,
    /// 100 when nothing is scheduled today.
    pub compliance_percentage: u32,
    pub today: Vec<ScheduledDose>,
}

/// Share of active prescriptions for one medication name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicationShare {
    pub name: String,
    pub count: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub weekly: Vec<DailyCompliance>,
    pub distribution: Vec<MedicationShare>,
    pub monthly: Vec<MonthlyCompliance>,
}

// ═══════════════════════════════════════════
// Dashboards
// ═══════════════════════════════════════════

pub fn admin_dashboard(
    conn: &Connection,
    policy: &ViewPolicy,
    now: NaiveDateTime,
) -> Result<AdminDashboard, ServiceError> {
    let today = now.date();
    let scope = &policy.patient_scope;
    Ok(AdminDashboard {
        total_patients: repository::count_patients(conn, scope)?,
        active_medications: repository::count_active_medications(conn, scope)?,
        todays_schedules: todays_schedule(conn, policy, today)?.len() as u32,
        compliance: recent_log_compliance(conn, policy, today)?,
        weekly: weekly_series(conn, policy, now)?,
    })
}

pub fn doctor_dashboard(
    conn: &Connection,
    policy: &ViewPolicy,
    now: NaiveDateTime,
) -> Result<DoctorDashboard, ServiceError> {
    let today = now.date();
    let scope = &policy.patient_scope;
    Ok(DoctorDashboard {
        my_patients: repository::count_patients(conn, scope)?,
        active_medications: repository::count_active_medications(conn, scope)?,
        todays_schedules: todays_schedule(conn, policy, today)?.len() as u32,
        compliance: recent_log_compliance(conn, policy, today)?,
    })
}

/// Today's doses for the linked patient. Not-yet-taken doses count as missed.
pub fn patient_dashboard(
    conn: &Connection,
    policy: &ViewPolicy,
    now: NaiveDateTime,
) -> Result<PatientDashboard, ServiceError> {
    let today = todays_schedule(conn, policy, now.date())?;
    let snapshot = compliance::aggregate(&today);
    Ok(PatientDashboard {
        todays_medications: snapshot.total,
        completed: snapshot.taken,
        missed: snapshot.missed,
        compliance_percentage: snapshot.compliance_percentage,
        today,
    })
}

pub fn analytics(
    conn: &Connection,
    policy: &ViewPolicy,
    now: NaiveDateTime,
) -> Result<Analytics, ServiceError> {
    let today = now.date();
    let trend_start = months_back(today, TREND_MONTHS);
    let events = due_events(conn, policy, trend_start, now)?;

    let week = ComplianceWindow::LastDays(WEEK_DAYS);
    let (week_from, week_to) = week.bounds(today);

    let active = repository::list_medications(
        conn,
        &MedicationFilter {
            scope: policy.patient_scope,
            active_only: true,
            search: None,
        },
    )?;

    Ok(Analytics {
        weekly: compliance::daily_series(&events, week_from, week_to),
        distribution: medication_distribution(active.iter().map(|m| m.medication.name.as_str())),
        monthly: compliance::monthly_series(&events, TREND_MONTHS, today),
    })
}

// ═══════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════

fn recent_log_compliance(
    conn: &Connection,
    policy: &ViewPolicy,
    today: NaiveDate,
) -> Result<ComplianceSnapshot, ServiceError> {
    let (from, to) = ComplianceWindow::LastDays(config::COMPLIANCE_WINDOW_DAYS).bounds(today);
    let range = day_filter(policy, from, to);
    let logs: Vec<ConsumptionLog> =
        repository::list_consumption_logs(conn, &range.scope, &range.from, &range.to)?;
    Ok(compliance::aggregate(&logs))
}

fn weekly_series(
    conn: &Connection,
    policy: &ViewPolicy,
    now: NaiveDateTime,
) -> Result<Vec<DailyCompliance>, ServiceError> {
    let (from, to) = ComplianceWindow::LastDays(WEEK_DAYS).bounds(now.date());
    let events = due_events(conn, policy, from, now)?;
    Ok(compliance::daily_series(&events, from, to))
}

/// Scoped events of active medications from `from` up to and including `now`.
fn due_events(
    conn: &Connection,
    policy: &ViewPolicy,
    from: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<ScheduleEvent>, ServiceError> {
    let mut filter = day_filter(policy, from, now.date());
    filter.to = now + Duration::seconds(1);
    Ok(repository::list_schedule_events(conn, &filter)?)
}

/// First day of the month `months - 1` months before `today`'s.
fn months_back(today: NaiveDate, months: u32) -> NaiveDate {
    let mut date = today.with_day0(0).unwrap_or(today);
    for _ in 1..months {
        date = date
            .pred_opt()
            .and_then(|d| d.with_day0(0))
            .unwrap_or(date);
    }
    date
}

/// Count prescriptions per name, most common first.
fn medication_distribution<'a, I>(names: I) -> Vec<MedicationShare>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let total: u32 = counts.values().sum();

    let mut shares: Vec<MedicationShare> = counts
        .into_iter()
        .map(|(name, count)| MedicationShare {
            name: name.to_string(),
            count,
            percentage: ComplianceSnapshot::from_counts(total, count).compliance_percentage,
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    shares
}
