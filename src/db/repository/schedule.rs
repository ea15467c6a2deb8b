use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_datetime, uuid_column, DatabaseError};
use crate::models::{DoseEventDraft, ScheduleEvent, ScheduleFilter, ScheduledDose};

use super::{param_refs, push_scope, SqlParams};

pub(crate) const SCHEDULE_COLUMNS: &str =
    "s.id, s.medication_id, s.scheduled_time, s.is_taken, s.taken_at, s.notes, s.created_at";

/// Map the 7 `SCHEDULE_COLUMNS` starting at column 0.
pub(crate) fn schedule_event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleEvent> {
    Ok(ScheduleEvent {
        id: uuid_column(row, 0)?,
        medication_id: uuid_column(row, 1)?,
        scheduled_time: row.get(2)?,
        is_taken: row.get(3)?,
        taken_at: row.get(4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Bulk-insert generated doses for a medication. Returns the new ids in order.
///
/// Callers wrap this in the same transaction as the medication insert.
pub fn insert_schedule_events(
    conn: &Connection,
    medication_id: &Uuid,
    drafts: &[DoseEventDraft],
    created_at: &NaiveDateTime,
) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO medication_schedules (id, medication_id, scheduled_time, is_taken, taken_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let med_id = medication_id.to_string();
    let created = format_datetime(created_at);
    let mut ids = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let id = Uuid::new_v4();
        stmt.execute(params![
            id.to_string(),
            med_id,
            format_datetime(&draft.scheduled_time),
            draft.is_taken as i32,
            draft.is_taken.then(|| created.clone()),
            created,
        ])?;
        ids.push(id);
    }
    Ok(ids)
}

pub fn get_schedule_event(conn: &Connection, id: &Uuid) -> Result<Option<ScheduleEvent>, DatabaseError> {
    let event = conn
        .query_row(
            &format!("SELECT {SCHEDULE_COLUMNS} FROM medication_schedules s WHERE s.id = ?1"),
            params![id.to_string()],
            schedule_event_from_row,
        )
        .optional()?;
    Ok(event)
}

/// Pending -> Taken. Returns 0 when the event was already taken (or absent).
pub fn mark_schedule_taken(
    conn: &Connection,
    id: &Uuid,
    taken_at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medication_schedules SET is_taken = 1, taken_at = ?2
         WHERE id = ?1 AND is_taken = 0",
        params![id.to_string(), format_datetime(taken_at)],
    )?;
    Ok(changed)
}

/// Drop the not-yet-taken doses of a medication (before regeneration).
/// Doses that already carry a consumption log stay.
pub fn delete_pending_schedule(conn: &Connection, medication_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM medication_schedules
         WHERE medication_id = ?1 AND is_taken = 0
           AND NOT EXISTS (
               SELECT 1 FROM consumption_logs c WHERE c.schedule_id = medication_schedules.id
           )",
        params![medication_id.to_string()],
    )?;
    Ok(deleted)
}

pub fn list_schedule_for_medication(
    conn: &Connection,
    medication_id: &Uuid,
) -> Result<Vec<ScheduleEvent>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM medication_schedules s
         WHERE s.medication_id = ?1 ORDER BY s.scheduled_time ASC"
    ))?;
    let events = stmt
        .query_map(params![medication_id.to_string()], schedule_event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

/// Scoped schedule events whose `scheduled_time` falls in `[from, to)`.
pub fn list_schedule_events(
    conn: &Connection,
    filter: &ScheduleFilter,
) -> Result<Vec<ScheduleEvent>, DatabaseError> {
    let mut sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM medication_schedules s
         JOIN medications m ON m.id = s.medication_id
         JOIN patients p ON p.id = m.patient_id
         WHERE s.scheduled_time >= ?1 AND s.scheduled_time < ?2"
    );
    let mut params = SqlParams::new();
    params.push(Box::new(format_datetime(&filter.from)));
    params.push(Box::new(format_datetime(&filter.to)));
    if filter.active_only {
        sql.push_str(" AND m.is_active = 1");
    }
    push_scope(&mut sql, &mut params, &filter.scope, "p.id", "p.assigned_doctor_id");
    sql.push_str(" ORDER BY s.scheduled_time ASC");

    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(param_refs(&params).as_slice(), schedule_event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

/// Scoped schedule events in `[from, to)` with medication and patient details.
pub fn list_scheduled_doses(
    conn: &Connection,
    filter: &ScheduleFilter,
) -> Result<Vec<ScheduledDose>, DatabaseError> {
    let mut sql = format!(
        "SELECT {SCHEDULE_COLUMNS}, m.name, m.dosage, m.instructions, p.id, p.full_name
         FROM medication_schedules s
         JOIN medications m ON m.id = s.medication_id
         JOIN patients p ON p.id = m.patient_id
         WHERE s.scheduled_time >= ?1 AND s.scheduled_time < ?2"
    );
    let mut params = SqlParams::new();
    params.push(Box::new(format_datetime(&filter.from)));
    params.push(Box::new(format_datetime(&filter.to)));
    if filter.active_only {
        sql.push_str(" AND m.is_active = 1");
    }
    push_scope(&mut sql, &mut params, &filter.scope, "p.id", "p.assigned_doctor_id");
    sql.push_str(" ORDER BY s.scheduled_time ASC, p.full_name ASC");

    let mut stmt = conn.prepare(&sql)?;
    let doses = stmt
        .query_map(param_refs(&params).as_slice(), |row| {
            Ok(ScheduledDose {
                event: schedule_event_from_row(row)?,
                medication_name: row.get(7)?,
                dosage: row.get(8)?,
                instructions: row.get(9)?,
                patient_id: uuid_column(row, 10)?,
                patient_name: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(doses)
}

/// A pending dose past its grace period with no consumption log yet.
#[derive(Debug, Clone)]
pub struct OverdueDose {
    pub event: ScheduleEvent,
    pub patient_id: Uuid,
}

pub fn list_overdue_unlogged(
    conn: &Connection,
    scheduled_before: &NaiveDateTime,
) -> Result<Vec<OverdueDose>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEDULE_COLUMNS}, m.patient_id FROM medication_schedules s
         JOIN medications m ON m.id = s.medication_id
         LEFT JOIN consumption_logs c ON c.schedule_id = s.id
         WHERE s.is_taken = 0 AND s.scheduled_time < ?1 AND c.id IS NULL AND m.is_active = 1
         ORDER BY s.scheduled_time ASC"
    ))?;
    let rows = stmt
        .query_map(params![format_datetime(scheduled_before)], |row| {
            Ok(OverdueDose {
                event: schedule_event_from_row(row)?,
                patient_id: uuid_column(row, 7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{ConsumptionStatus, Role};
    use crate::models::{ConsumptionLog, PatientScope};
    use crate::test_support::{dt, seed_medication, seed_patient, seed_user, test_db};

    use super::super::insert_consumption_log;

    fn day_filter(scope: PatientScope, day: &str) -> ScheduleFilter {
        ScheduleFilter {
            scope,
            from: dt(&format!("{day} 00:00")),
            to: dt(&format!("{day} 00:00")) + chrono::Duration::days(1),
            active_only: true,
        }
    }

    #[test]
    fn persisted_rows_match_generator_output() {
        let conn = test_db();
        let patient = seed_patient(&conn, "Ani", "ani@clinic.test", None);
        let med = seed_medication(&conn, patient.id, "Amoxicillin", 3, 7, "2024-03-01");

        let events = list_schedule_for_medication(&conn, &med.id).unwrap();
        assert_eq!(events.len(), 21);
        assert!(events.iter().all(|e| !e.is_taken && e.taken_at.is_none()));
        assert_eq!(events[0].scheduled_time, dt("2024-03-01 08:00"));
        assert!(events.windows(2).all(|w| w[0].scheduled_time <= w[1].scheduled_time));
    }

    #[test]
    fn mark_taken_only_once() {
        let conn = test_db();
        let patient = seed_patient(&conn, "Ani", "ani@clinic.test", None);
        let med = seed_medication(&conn, patient.id, "Amoxicillin", 1, 1, "2024-03-01");
        let event = &list_schedule_for_medication(&conn, &med.id).unwrap()[0];

        assert_eq!(mark_schedule_taken(&conn, &event.id, &dt("2024-03-01 08:10")).unwrap(), 1);
        assert_eq!(mark_schedule_taken(&conn, &event.id, &dt("2024-03-01 09:00")).unwrap(), 0);

        let loaded = get_schedule_event(&conn, &event.id).unwrap().unwrap();
        assert!(loaded.is_taken);
        assert_eq!(loaded.taken_at, Some(dt("2024-03-01 08:10")));
    }

    #[test]
    fn delete_pending_keeps_taken_rows() {
        let conn = test_db();
        let patient = seed_patient(&conn, "Ani", "ani@clinic.test", None);
        let med = seed_medication(&conn, patient.id, "Amoxicillin", 2, 2, "2024-03-01");
        let events = list_schedule_for_medication(&conn, &med.id).unwrap();
        mark_schedule_taken(&conn, &events[0].id, &dt("2024-03-01 08:05")).unwrap();

        assert_eq!(delete_pending_schedule(&conn, &med.id).unwrap(), 3);
        let left = list_schedule_for_medication(&conn, &med.id).unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].is_taken);
    }

    #[test]
    fn day_listing_respects_scope() {
        let conn = test_db();
        let doctor = seed_user(&conn, Role::Doctor, "dr@clinic.test");
        let mine = seed_patient(&conn, "Ani", "ani@clinic.test", Some(doctor.id));
        let other = seed_patient(&conn, "Budi", "budi@clinic.test", None);
        seed_medication(&conn, mine.id, "Metformin", 2, 5, "2024-03-01");
        seed_medication(&conn, other.id, "Amlodipine", 1, 5, "2024-03-01");

        let all = list_schedule_events(&conn, &day_filter(PatientScope::All, "2024-03-02")).unwrap();
        assert_eq!(all.len(), 3);

        let scoped = list_schedule_events(
            &conn,
            &day_filter(PatientScope::AssignedTo(doctor.id), "2024-03-02"),
        )
        .unwrap();
        assert_eq!(scoped.len(), 2);

        let none = list_schedule_events(&conn, &day_filter(PatientScope::Only(None), "2024-03-02")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn joined_listing_carries_medication_and_patient() {
        let conn = test_db();
        let patient = seed_patient(&conn, "Ani", "ani@clinic.test", None);
        seed_medication(&conn, patient.id, "Metformin", 2, 1, "2024-03-01");

        let doses = list_scheduled_doses(&conn, &day_filter(PatientScope::All, "2024-03-01")).unwrap();
        assert_eq!(doses.len(), 2);
        assert_eq!(doses[0].medication_name, "Metformin");
        assert_eq!(doses[0].patient_id, patient.id);
        assert_eq!(doses[1].event.scheduled_time, dt("2024-03-01 20:00"));
    }

    #[test]
    fn overdue_excludes_taken_and_logged_events() {
        let conn = test_db();
        let patient = seed_patient(&conn, "Ani", "ani@clinic.test", None);
        let med = seed_medication(&conn, patient.id, "Metformin", 3, 1, "2024-03-01");
        let events = list_schedule_for_medication(&conn, &med.id).unwrap();

        mark_schedule_taken(&conn, &events[0].id, &dt("2024-03-01 08:00")).unwrap();
        insert_consumption_log(
            &conn,
            &ConsumptionLog {
                id: Uuid::new_v4(),
                patient_id: patient.id,
                medication_id: med.id,
                schedule_id: Some(events[1].id),
                scheduled_time: events[1].scheduled_time,
                actual_time: None,
                status: ConsumptionStatus::Missed,
                notes: None,
                created_at: dt("2024-03-01 23:30"),
            },
        )
        .unwrap();

        let overdue = list_overdue_unlogged(&conn, &dt("2024-03-02 00:00")).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].event.id, events[2].id);
        assert_eq!(overdue[0].patient_id, patient.id);
    }

    #[test]
    fn delete_pending_keeps_taken_and_logged_events() {
        let conn = test_db();
        let patient = seed_patient(&conn, "Ani", "ani@clinic.test", None);
        let med = seed_medication(&conn, patient.id, "Metformin", 3, 1, "2024-03-01");
        let events = list_schedule_for_medication(&conn, &med.id).unwrap();

        mark_schedule_taken(&conn, &events[0].id, &dt("2024-03-01 08:00")).unwrap();
        insert_consumption_log(
            &conn,
            &ConsumptionLog {
                id: Uuid::new_v4(),
                patient_id: patient.id,
                medication_id: med.id,
                schedule_id: Some(events[1].id),
                scheduled_time: events[1].scheduled_time,
                actual_time: None,
                status: ConsumptionStatus::Missed,
                notes: None,
                created_at: dt("2024-03-01 17:00"),
            },
        )
        .unwrap();

        assert_eq!(delete_pending_schedule(&conn, &med.id).unwrap(), 1);
        let left: Vec<Uuid> = list_schedule_for_medication(&conn, &med.id)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(left, vec![events[0].id, events[1].id]);
    }

    #[test]
    fn removing_an_event_detaches_its_log() {
        let conn = test_db();
        let patient = seed_patient(&conn, "Ani", "ani@clinic.test", None);
        let med = seed_medication(&conn, patient.id, "Metformin", 1, 1, "2024-03-01");
        let event = list_schedule_for_medication(&conn, &med.id).unwrap().remove(0);
        insert_consumption_log(
            &conn,
            &ConsumptionLog {
                id: Uuid::new_v4(),
                patient_id: patient.id,
                medication_id: med.id,
                schedule_id: Some(event.id),
                scheduled_time: event.scheduled_time,
                actual_time: None,
                status: ConsumptionStatus::Missed,
                notes: None,
                created_at: dt("2024-03-01 10:00"),
            },
        )
        .unwrap();

        conn.execute(
            "DELETE FROM medication_schedules WHERE id = ?1",
            rusqlite::params![event.id.to_string()],
        )
        .unwrap();
        let detached: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM consumption_logs WHERE schedule_id IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(detached, 1);
    }
}
