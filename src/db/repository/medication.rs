use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_date, format_datetime, uuid_column, DatabaseError};
use crate::models::{Medication, MedicationFilter, MedicationListItem, PatientScope};

use super::{param_refs, push_scope, push_search, SqlParams};

pub(crate) const MEDICATION_COLUMNS: &str = "m.id, m.patient_id, m.name, m.dosage, m.frequency,
     m.duration_days, m.instructions, m.prescribed_by, m.start_date, m.end_date, m.is_active,
     m.created_at, m.updated_at";

/// Map the 13 `MEDICATION_COLUMNS` starting at column 0.
pub(crate) fn medication_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        frequency: row.get(4)?,
        duration_days: row.get(5)?,
        instructions: row.get(6)?,
        prescribed_by: row.get(7)?,
        start_date: row.get(8)?,
        end_date: row.get(9)?,
        is_active: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub fn insert_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medications (id, patient_id, name, dosage, frequency, duration_days,
         instructions, prescribed_by, start_date, end_date, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            med.id.to_string(),
            med.patient_id.to_string(),
            med.name,
            med.dosage,
            med.frequency,
            med.duration_days,
            med.instructions,
            med.prescribed_by,
            format_date(&med.start_date),
            format_date(&med.end_date),
            med.is_active as i32,
            format_datetime(&med.created_at),
            format_datetime(&med.updated_at),
        ],
    )?;
    Ok(())
}

/// Persist every mutable column of an existing medication.
pub fn update_medication(conn: &Connection, med: &Medication) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET patient_id = ?2, name = ?3, dosage = ?4, frequency = ?5,
         duration_days = ?6, instructions = ?7, prescribed_by = ?8, start_date = ?9,
         end_date = ?10, is_active = ?11, updated_at = ?12
         WHERE id = ?1",
        params![
            med.id.to_string(),
            med.patient_id.to_string(),
            med.name,
            med.dosage,
            med.frequency,
            med.duration_days,
            med.instructions,
            med.prescribed_by,
            format_date(&med.start_date),
            format_date(&med.end_date),
            med.is_active as i32,
            format_datetime(&med.updated_at),
        ],
    )?;
    Ok(changed)
}

pub fn set_medication_active(
    conn: &Connection,
    id: &Uuid,
    active: bool,
    updated_at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), active as i32, format_datetime(updated_at)],
    )?;
    Ok(changed)
}

pub fn get_medication(conn: &Connection, id: &Uuid) -> Result<Option<Medication>, DatabaseError> {
    let med = conn
        .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications m WHERE m.id = ?1"),
            params![id.to_string()],
            medication_from_row,
        )
        .optional()?;
    Ok(med)
}

/// Scoped medications with their patient's name, newest first.
///
/// The search term matches the medication name or the patient name.
pub fn list_medications(
    conn: &Connection,
    filter: &MedicationFilter,
) -> Result<Vec<MedicationListItem>, DatabaseError> {
    let mut sql = format!(
        "SELECT {MEDICATION_COLUMNS}, p.full_name FROM medications m
         JOIN patients p ON p.id = m.patient_id
         WHERE 1=1"
    );
    let mut params = SqlParams::new();
    if filter.active_only {
        sql.push_str(" AND m.is_active = 1");
    }
    push_scope(&mut sql, &mut params, &filter.scope, "p.id", "p.assigned_doctor_id");
    push_search(&mut sql, &mut params, filter.search.as_deref(), &["m.name", "p.full_name"]);
    sql.push_str(" ORDER BY m.created_at DESC, m.name ASC");

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(param_refs(&params).as_slice(), |row| {
            Ok(MedicationListItem {
                medication: medication_from_row(row)?,
                patient_name: row.get(13)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn count_active_medications(conn: &Connection, scope: &PatientScope) -> Result<u32, DatabaseError> {
    let mut sql = String::from(
        "SELECT COUNT(*) FROM medications m
         JOIN patients p ON p.id = m.patient_id
         WHERE m.is_active = 1",
    );
    let mut params = SqlParams::new();
    push_scope(&mut sql, &mut params, scope, "p.id", "p.assigned_doctor_id");
    let count = conn.query_row(&sql, param_refs(&params).as_slice(), |row| row.get(0))?;
    Ok(count)
}
