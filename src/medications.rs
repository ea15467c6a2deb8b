//! Prescriptions and their generated dose schedules.
//!
//! Creating a medication and persisting its schedule happen in one
//! transaction, so a medication row never exists without its doses.
//! Editing the plan (start date, duration, frequency) regenerates the
//! pending doses and leaves taken or already logged ones untouched.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::compliance::{self, ComplianceSnapshot};
use crate::db::repository;
use crate::error::ServiceError;
use crate::models::{
    Medication, MedicationFilter, MedicationInput, MedicationListItem, ScheduleEvent,
};
use crate::patients::ensure_in_scope;
use crate::schedule::{derive_end_date, generate_schedule, parse_plan_date};
use crate::session::{Capability, Session, ViewPolicy};

// ═══════════════════════════════════════════
// View types
// ═══════════════════════════════════════════

/// A medication with its full schedule and adherence so far.
#[derive(Debug, Clone, Serialize)]
pub struct MedicationDetail {
    #[serde(flatten)]
    pub item: MedicationListItem,
    pub schedule: Vec<ScheduleEvent>,
    /// Over doses scheduled before `now`.
    pub compliance: ComplianceSnapshot,
}

/// Result of a prescription: the stored row and how many doses were planned.
#[derive(Debug, Clone, Serialize)]
pub struct Prescription {
    pub medication: Medication,
    pub doses_scheduled: usize,
}

// ═══════════════════════════════════════════
// Mutations
// ═══════════════════════════════════════════

/// Store a new medication and its generated schedule atomically.
///
/// A missing start date means "today"; `prescribed_by` is the caller's name.
pub fn prescribe_medication(
    conn: &Connection,
    session: &Session,
    policy: &ViewPolicy,
    input: MedicationInput,
    now: NaiveDateTime,
) -> Result<Prescription, ServiceError> {
    policy.require(Capability::Prescribe)?;
    ensure_in_scope(conn, policy, &input.patient_id)?;

    let start_date = resolve_start_date(input.start_date.as_deref(), now.date())?;
    let plan = validate_plan(&input, start_date)?;

    let medication = Medication {
        id: Uuid::new_v4(),
        patient_id: input.patient_id,
        name: plan.name,
        dosage: plan.dosage,
        frequency: input.frequency,
        duration_days: input.duration_days,
        instructions: input.instructions.trim().to_string(),
        prescribed_by: session.user.full_name.clone(),
        start_date,
        end_date: plan.end_date,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let drafts = generate_schedule(&medication)?;

    let tx = conn.unchecked_transaction()?;
    repository::insert_medication(&tx, &medication)?;
    repository::insert_schedule_events(&tx, &medication.id, &drafts, &now)?;
    tx.commit()?;

    tracing::info!(
        medication_id = %medication.id,
        patient_id = %medication.patient_id,
        doses = drafts.len(),
        "Prescribed medication"
    );
    Ok(Prescription {
        medication,
        doses_scheduled: drafts.len(),
    })
}

/// Edit a medication. A changed plan replaces the pending doses.
pub fn update_medication(
    conn: &Connection,
    session: &Session,
    policy: &ViewPolicy,
    id: &Uuid,
    input: MedicationInput,
    now: NaiveDateTime,
) -> Result<Medication, ServiceError> {
    policy.require(Capability::Prescribe)?;
    let existing = load_in_scope(conn, policy, id)?;
    if input.patient_id != existing.patient_id {
        ensure_in_scope(conn, policy, &input.patient_id)?;
    }

    let start_date = resolve_start_date(input.start_date.as_deref(), existing.start_date)?;
    let plan = validate_plan(&input, start_date)?;
    let plan_changed = start_date != existing.start_date
        || input.duration_days != existing.duration_days
        || input.frequency != existing.frequency;

    let updated = Medication {
        patient_id: input.patient_id,
        name: plan.name,
        dosage: plan.dosage,
        frequency: input.frequency,
        duration_days: input.duration_days,
        instructions: input.instructions.trim().to_string(),
        prescribed_by: session.user.full_name.clone(),
        start_date,
        end_date: plan.end_date,
        updated_at: now,
        ..existing
    };

    let tx = conn.unchecked_transaction()?;
    repository::update_medication(&tx, &updated)?;
    if plan_changed {
        let regenerated = regenerate_pending(&tx, &updated, &now)?;
        tracing::info!(medication_id = %id, doses = regenerated, "Regenerated pending doses");
    }
    tx.commit()?;

    Ok(updated)
}

/// Logical delete: the medication leaves active lists, its history stays.
pub fn deactivate_medication(
    conn: &Connection,
    policy: &ViewPolicy,
    id: &Uuid,
    now: NaiveDateTime,
) -> Result<(), ServiceError> {
    policy.require(Capability::Prescribe)?;
    load_in_scope(conn, policy, id)?;
    repository::set_medication_active(conn, id, false, &now)?;
    tracing::info!(medication_id = %id, "Deactivated medication");
    Ok(())
}

// ═══════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════

/// Active medications in scope; `search` matches medication or patient name.
pub fn list_active_medications(
    conn: &Connection,
    policy: &ViewPolicy,
    search: Option<&str>,
) -> Result<Vec<MedicationListItem>, ServiceError> {
    let filter = MedicationFilter {
        scope: policy.patient_scope,
        active_only: true,
        search: search.map(str::to_string),
    };
    Ok(repository::list_medications(conn, &filter)?)
}

pub fn medication_detail(
    conn: &Connection,
    policy: &ViewPolicy,
    id: &Uuid,
    now: NaiveDateTime,
) -> Result<MedicationDetail, ServiceError> {
    let medication = load_in_scope(conn, policy, id)?;
    let patient_name = repository::get_patient(conn, &medication.patient_id)?
        .map(|p| p.full_name)
        .unwrap_or_default();
    let schedule = repository::list_schedule_for_medication(conn, id)?;
    let compliance = compliance::aggregate(schedule.iter().filter(|e| e.scheduled_time <= now));

    Ok(MedicationDetail {
        item: MedicationListItem {
            medication,
            patient_name,
        },
        schedule,
        compliance,
    })
}

// ═══════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════

struct ValidPlan {
    name: String,
    dosage: String,
    end_date: NaiveDate,
}

fn resolve_start_date(raw: Option<&str>, fallback: NaiveDate) -> Result<NaiveDate, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => Ok(parse_plan_date(Some(value), "start date")?),
        None => Ok(fallback),
    }
}

fn validate_plan(input: &MedicationInput, start_date: NaiveDate) -> Result<ValidPlan, ServiceError> {
    let name = input.name.trim().to_string();
    let dosage = input.dosage.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("medication name is required".into()));
    }
    if dosage.is_empty() {
        return Err(ServiceError::InvalidInput("dosage is required".into()));
    }
    if input.frequency < 1 {
        return Err(ServiceError::InvalidInput(
            "frequency must be at least one dose per day".into(),
        ));
    }
    let end_date = derive_end_date(start_date, input.duration_days)?;
    Ok(ValidPlan {
        name,
        dosage,
        end_date,
    })
}

/// Out-of-scope medications are reported as missing.
fn load_in_scope(conn: &Connection, policy: &ViewPolicy, id: &Uuid) -> Result<Medication, ServiceError> {
    let medication = repository::get_medication(conn, id)?
        .ok_or_else(|| ServiceError::not_found("Medication", id))?;
    if !repository::patient_in_scope(conn, &medication.patient_id, &policy.patient_scope)? {
        return Err(ServiceError::not_found("Medication", id));
    }
    Ok(medication)
}

/// Replace pending doses with the new plan. Taken or already logged doses
/// survive, and their instants are not generated again.
fn regenerate_pending(
    conn: &Connection,
    medication: &Medication,
    now: &NaiveDateTime,
) -> Result<usize, ServiceError> {
    repository::delete_pending_schedule(conn, &medication.id)?;
    let kept: HashSet<NaiveDateTime> = repository::list_schedule_for_medication(conn, &medication.id)?
        .into_iter()
        .map(|e| e.scheduled_time)
        .collect();

    let drafts: Vec<_> = generate_schedule(medication)?
        .into_iter()
        .filter(|d| !kept.contains(&d.scheduled_time))
        .collect();
    repository::insert_schedule_events(conn, &medication.id, &drafts, now)?;
    Ok(drafts.len())
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
