//! Patient records, filtered by the caller's view policy.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository;
use crate::error::ServiceError;
use crate::models::{Patient, PatientFilter, PatientInput};
use crate::session::{Capability, ViewPolicy};

pub fn list_patients(
    conn: &Connection,
    policy: &ViewPolicy,
    search: Option<&str>,
) -> Result<Vec<Patient>, ServiceError> {
    let filter = PatientFilter {
        scope: policy.patient_scope,
        search: search.map(str::to_string),
    };
    Ok(repository::list_patients(conn, &filter)?)
}

/// A doctor-created patient is assigned to that doctor.
pub fn create_patient(
    conn: &Connection,
    policy: &ViewPolicy,
    input: PatientInput,
    now: NaiveDateTime,
) -> Result<Patient, ServiceError> {
    policy.require(Capability::EditPatients)?;
    let input = validate(input)?;

    let patient = Patient {
        id: Uuid::new_v4(),
        full_name: input.full_name,
        email: input.email,
        phone: input.phone,
        birth_date: input.birth_date,
        address: input.address,
        medical_condition: input.medical_condition,
        emergency_contact: input.emergency_contact,
        assigned_doctor_id: policy.assigning_doctor(),
        created_at: now,
        updated_at: now,
    };
    repository::insert_patient(conn, &patient)?;
    tracing::info!(patient_id = %patient.id, "Created patient");
    Ok(patient)
}

pub fn update_patient(
    conn: &Connection,
    policy: &ViewPolicy,
    id: &Uuid,
    input: PatientInput,
    now: NaiveDateTime,
) -> Result<Patient, ServiceError> {
    policy.require(Capability::EditPatients)?;
    ensure_in_scope(conn, policy, id)?;
    let input = validate(input)?;

    repository::update_patient_fields(conn, id, &input, &now)?;
    repository::get_patient(conn, id)?.ok_or_else(|| ServiceError::not_found("Patient", id))
}

/// Hard delete. Medications, schedules and logs cascade.
pub fn delete_patient(conn: &Connection, policy: &ViewPolicy, id: &Uuid) -> Result<(), ServiceError> {
    policy.require(Capability::DeletePatients)?;
    if repository::delete_patient(conn, id)? == 0 {
        return Err(ServiceError::not_found("Patient", id));
    }
    tracing::info!(patient_id = %id, "Deleted patient");
    Ok(())
}

/// Out-of-scope patients are reported as missing, not forbidden.
pub(crate) fn ensure_in_scope(conn: &Connection, policy: &ViewPolicy, id: &Uuid) -> Result<(), ServiceError> {
    if repository::patient_in_scope(conn, id, &policy.patient_scope)? {
        Ok(())
    } else {
        Err(ServiceError::not_found("Patient", id))
    }
}

fn validate(mut input: PatientInput) -> Result<PatientInput, ServiceError> {
    input.full_name = input.full_name.trim().to_string();
    input.email = input.email.trim().to_string();
    if input.full_name.is_empty() {
        return Err(ServiceError::InvalidInput("patient name is required".into()));
    }
    if !input.email.contains('@') {
        return Err(ServiceError::InvalidInput(format!(
            "'{}' is not an email address",
            input.email
        )));
    }
    Ok(input)
}
