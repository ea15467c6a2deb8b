use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{enum_column, format_datetime, opt_uuid_column, uuid_column, DatabaseError};
use crate::models::{ConsumptionLog, PatientScope};

use super::{param_refs, push_scope, SqlParams};

const LOG_COLUMNS: &str = "c.id, c.patient_id, c.medication_id, c.schedule_id, c.scheduled_time,
     c.actual_time, c.status, c.notes, c.created_at";

fn log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConsumptionLog> {
    Ok(ConsumptionLog {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        medication_id: uuid_column(row, 2)?,
        schedule_id: opt_uuid_column(row, 3)?,
        scheduled_time: row.get(4)?,
        actual_time: row.get(5)?,
        status: enum_column(row, 6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Append a log. A schedule event is logged at most once: returns `false`
/// when a log for `log.schedule_id` already exists.
pub fn insert_consumption_log(conn: &Connection, log: &ConsumptionLog) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO consumption_logs (id, patient_id, medication_id, schedule_id,
         scheduled_time, actual_time, status, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            log.id.to_string(),
            log.patient_id.to_string(),
            log.medication_id.to_string(),
            log.schedule_id.map(|id| id.to_string()),
            format_datetime(&log.scheduled_time),
            log.actual_time.as_ref().map(format_datetime),
            log.status.as_str(),
            log.notes,
            format_datetime(&log.created_at),
        ],
    )?;
    Ok(inserted > 0)
}

/// Turn the `missed` log of a schedule event into `late` once it is taken.
pub fn upgrade_missed_log(
    conn: &Connection,
    schedule_id: &Uuid,
    actual_time: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE consumption_logs SET status = 'late', actual_time = ?2
         WHERE schedule_id = ?1 AND status = 'missed'",
        params![schedule_id.to_string(), format_datetime(actual_time)],
    )?;
    Ok(changed)
}

/// Scoped logs whose `scheduled_time` falls in `[from, to)`, newest first.
pub fn list_consumption_logs(
    conn: &Connection,
    scope: &PatientScope,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<ConsumptionLog>, DatabaseError> {
    let mut sql = format!(
        "SELECT {LOG_COLUMNS} FROM consumption_logs c
         JOIN patients p ON p.id = c.patient_id
         WHERE c.scheduled_time >= ?1 AND c.scheduled_time < ?2"
    );
    let mut params = SqlParams::new();
    params.push(Box::new(format_datetime(from)));
    params.push(Box::new(format_datetime(to)));
    push_scope(&mut sql, &mut params, scope, "p.id", "p.assigned_doctor_id");
    sql.push_str(" ORDER BY c.scheduled_time DESC");

    let mut stmt = conn.prepare(&sql)?;
    let logs = stmt
        .query_map(param_refs(&params).as_slice(), log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

pub fn count_logs_for_schedule(conn: &Connection, schedule_id: &Uuid) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM consumption_logs WHERE schedule_id = ?1",
        params![schedule_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}
