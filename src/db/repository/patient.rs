use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_date, format_datetime, opt_uuid_column, uuid_column, DatabaseError};
use crate::models::{Patient, PatientFilter, PatientInput, PatientScope};

use super::{param_refs, push_scope, push_search, SqlParams};

const PATIENT_COLUMNS: &str = "p.id, p.full_name, p.email, p.phone, p.birth_date, p.address,
     p.medical_condition, p.emergency_contact, p.assigned_doctor_id, p.created_at, p.updated_at";

fn patient_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: uuid_column(row, 0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        birth_date: row.get(4)?,
        address: row.get(5)?,
        medical_condition: row.get(6)?,
        emergency_contact: row.get(7)?,
        assigned_doctor_id: opt_uuid_column(row, 8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, full_name, email, phone, birth_date, address, medical_condition,
         emergency_contact, assigned_doctor_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            patient.id.to_string(),
            patient.full_name,
            patient.email,
            patient.phone,
            patient.birth_date.as_ref().map(format_date),
            patient.address,
            patient.medical_condition,
            patient.emergency_contact,
            patient.assigned_doctor_id.map(|id| id.to_string()),
            format_datetime(&patient.created_at),
            format_datetime(&patient.updated_at),
        ],
    )?;
    Ok(())
}

/// Overwrite the editable fields. Returns the number of rows touched.
pub fn update_patient_fields(
    conn: &Connection,
    id: &Uuid,
    input: &PatientInput,
    updated_at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET full_name = ?2, email = ?3, phone = ?4, birth_date = ?5, address = ?6,
         medical_condition = ?7, emergency_contact = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            id.to_string(),
            input.full_name,
            input.email,
            input.phone,
            input.birth_date.as_ref().map(format_date),
            input.address,
            input.medical_condition,
            input.emergency_contact,
            format_datetime(updated_at),
        ],
    )?;
    Ok(changed)
}

/// Hard delete; medications, schedules and logs go with it.
pub fn delete_patient(conn: &Connection, id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute("DELETE FROM patients WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted)
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients p WHERE p.id = ?1"),
            params![id.to_string()],
            patient_from_row,
        )
        .optional()?;
    Ok(patient)
}

/// The patient record linked to a patient-role account.
pub fn find_patient_by_email(conn: &Connection, email: &str) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!(
                "SELECT {PATIENT_COLUMNS} FROM patients p
                 WHERE p.email = ?1 COLLATE NOCASE
                 ORDER BY p.created_at ASC LIMIT 1"
            ),
            params![email.trim()],
            patient_from_row,
        )
        .optional()?;
    Ok(patient)
}

/// Whether `patient_id` exists and falls inside `scope`.
pub fn patient_in_scope(
    conn: &Connection,
    patient_id: &Uuid,
    scope: &PatientScope,
) -> Result<bool, DatabaseError> {
    let mut sql = String::from("SELECT COUNT(*) FROM patients p WHERE p.id = ?1");
    let mut params = SqlParams::new();
    params.push(Box::new(patient_id.to_string()));
    push_scope(&mut sql, &mut params, scope, "p.id", "p.assigned_doctor_id");
    let count: i64 = conn.query_row(&sql, param_refs(&params).as_slice(), |row| row.get(0))?;
    Ok(count > 0)
}

pub fn list_patients(conn: &Connection, filter: &PatientFilter) -> Result<Vec<Patient>, DatabaseError> {
    let mut sql = format!("SELECT {PATIENT_COLUMNS} FROM patients p WHERE 1=1");
    let mut params = SqlParams::new();
    push_scope(&mut sql, &mut params, &filter.scope, "p.id", "p.assigned_doctor_id");
    push_search(&mut sql, &mut params, filter.search.as_deref(), &["p.full_name", "p.email"]);
    sql.push_str(" ORDER BY p.created_at DESC, p.full_name ASC");

    let mut stmt = conn.prepare(&sql)?;
    let patients = stmt
        .query_map(param_refs(&params).as_slice(), patient_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(patients)
}

pub fn count_patients(conn: &Connection, scope: &PatientScope) -> Result<u32, DatabaseError> {
    let mut sql = String::from("SELECT COUNT(*) FROM patients p WHERE 1=1");
    let mut params = SqlParams::new();
    push_scope(&mut sql, &mut params, scope, "p.id", "p.assigned_doctor_id");
    let count = conn.query_row(&sql, param_refs(&params).as_slice(), |row| row.get(0))?;
    Ok(count)
}
