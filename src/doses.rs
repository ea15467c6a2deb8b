//! Dose administration: today's list, marking doses taken, and the
//! consumption log that records actual against scheduled times.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::compliance::{self, ComplianceSnapshot, StatusBreakdown};
use crate::config;
use crate::db::repository;
use crate::error::ServiceError;
use crate::models::enums::ConsumptionStatus;
use crate::models::{ConsumptionLog, ScheduleEvent, ScheduleFilter, ScheduledDose};
use crate::session::{Capability, ViewPolicy};

#[derive(Debug, Clone, Serialize)]
pub struct DoseRecord {
    pub event: ScheduleEvent,
    pub status: ConsumptionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionHistory {
    pub logs: Vec<ConsumptionLog>,
    pub breakdown: StatusBreakdown,
    pub compliance: ComplianceSnapshot,
}

fn late_grace() -> Duration {
    Duration::minutes(config::LATE_GRACE_MINUTES)
}

/// `[day 00:00, day+1 00:00)` as a schedule filter.
pub(crate) fn day_filter(policy: &ViewPolicy, from: NaiveDate, to: NaiveDate) -> ScheduleFilter {
    ScheduleFilter {
        scope: policy.patient_scope,
        from: from.and_time(NaiveTime::default()),
        to: to.and_time(NaiveTime::default()) + Duration::days(1),
        active_only: true,
    }
}

/// Scoped doses of active medications scheduled on `today`.
pub fn todays_schedule(
    conn: &Connection,
    policy: &ViewPolicy,
    today: NaiveDate,
) -> Result<Vec<ScheduledDose>, ServiceError> {
    Ok(repository::list_scheduled_doses(conn, &day_filter(policy, today, today))?)
}

/// `Pending -> Taken`, plus a consumption log entry.
///
/// The log is `late` when `now` is past the slot plus the grace period. If
/// the dose had already been logged as missed, that log becomes `late`.
pub fn mark_dose_taken(
    conn: &Connection,
    policy: &ViewPolicy,
    event_id: &Uuid,
    now: NaiveDateTime,
) -> Result<DoseRecord, ServiceError> {
    policy.require(Capability::RecordDoses)?;
    let event = repository::get_schedule_event(conn, event_id)?
        .ok_or_else(|| ServiceError::not_found("Schedule event", event_id))?;
    let medication = repository::get_medication(conn, &event.medication_id)?
        .ok_or_else(|| ServiceError::not_found("Schedule event", event_id))?;
    if !repository::patient_in_scope(conn, &medication.patient_id, &policy.patient_scope)? {
        return Err(ServiceError::not_found("Schedule event", event_id));
    }
    if event.is_taken {
        return Err(ServiceError::AlreadyTaken(event_id.to_string()));
    }

    let status = if now > event.scheduled_time + late_grace() {
        ConsumptionStatus::Late
    } else {
        ConsumptionStatus::Taken
    };

    let tx = conn.unchecked_transaction()?;
    if repository::mark_schedule_taken(&tx, event_id, &now)? == 0 {
        return Err(ServiceError::AlreadyTaken(event_id.to_string()));
    }
    let log = ConsumptionLog {
        id: Uuid::new_v4(),
        patient_id: medication.patient_id,
        medication_id: medication.id,
        schedule_id: Some(event.id),
        scheduled_time: event.scheduled_time,
        actual_time: Some(now),
        status,
        notes: None,
        created_at: now,
    };
    let status = if repository::insert_consumption_log(&tx, &log)? {
        status
    } else {
        repository::upgrade_missed_log(&tx, event_id, &now)?;
        ConsumptionStatus::Late
    };
    tx.commit()?;

    tracing::info!(event_id = %event_id, status = %status, "Dose marked taken");
    Ok(DoseRecord {
        event: ScheduleEvent {
            is_taken: true,
            taken_at: Some(now),
            ..event
        },
        status,
    })
}

/// Log every pending dose older than the grace period as missed.
///
/// Idempotent: each dose is logged at most once. Returns how many logs were
/// written.
pub fn record_missed_doses(conn: &Connection, now: NaiveDateTime) -> Result<usize, ServiceError> {
    let overdue = repository::list_overdue_unlogged(conn, &(now - late_grace()))?;
    if overdue.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    let mut written = 0;
    for dose in &overdue {
        let log = ConsumptionLog {
            id: Uuid::new_v4(),
            patient_id: dose.patient_id,
            medication_id: dose.event.medication_id,
            schedule_id: Some(dose.event.id),
            scheduled_time: dose.event.scheduled_time,
            actual_time: None,
            status: ConsumptionStatus::Missed,
            notes: None,
            created_at: now,
        };
        if repository::insert_consumption_log(&tx, &log)? {
            written += 1;
        }
    }
    tx.commit()?;

    tracing::debug!(count = written, "Recorded missed doses");
    Ok(written)
}

/// Scoped consumption logs for doses scheduled in `[from, to]`.
pub fn consumption_history(
    conn: &Connection,
    policy: &ViewPolicy,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<ConsumptionHistory, ServiceError> {
    if to < from {
        return Err(ServiceError::InvalidInput(format!(
            "history range ends ({to}) before it starts ({from})"
        )));
    }
    let range = day_filter(policy, from, to);
    let logs = repository::list_consumption_logs(conn, &range.scope, &range.from, &range.to)?;
    let breakdown = compliance::status_breakdown(logs.iter().map(|l| l.status));
    let compliance = compliance::aggregate(&logs);
    Ok(ConsumptionHistory {
        logs,
        breakdown,
        compliance,
    })
}
