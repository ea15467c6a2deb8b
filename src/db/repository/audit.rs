use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::{format_datetime, DatabaseError};

/// One buffered audit row: (timestamp, actor, role, action, entity).
pub type AuditRow = (String, String, String, String, String);

/// Insert a batch of audit entries into the audit_log table.
pub fn insert_audit_entries(conn: &Connection, entries: &[AuditRow]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO audit_log (timestamp, actor, role, action, entity) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (timestamp, actor, role, action, entity) in entries {
        stmt.execute(params![timestamp, actor, role, action, entity])?;
    }
    Ok(())
}

/// Delete audit entries recorded before `cutoff`.
pub fn prune_audit_log(conn: &Connection, cutoff: &NaiveDateTime) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < ?1",
        params![format_datetime(cutoff)],
    )?;
    Ok(deleted)
}

/// Audit entries for one actor since `since`, newest first.
/// Returns (timestamp, action, entity) tuples.
pub fn query_audit_by_actor(
    conn: &Connection,
    actor: &str,
    since: &NaiveDateTime,
) -> Result<Vec<(String, String, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, action, entity FROM audit_log
         WHERE actor = ?1 AND timestamp >= ?2
         ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![actor, format_datetime(since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dt, test_db};

    fn row(ts: &str, actor: &str, action: &str) -> AuditRow {
        (
            format_datetime(&dt(ts)),
            actor.to_string(),
            "doctor".to_string(),
            action.to_string(),
            "patient:1".to_string(),
        )
    }

    #[test]
    fn insert_and_query_by_actor() {
        let conn = test_db();
        insert_audit_entries(
            &conn,
            &[
                row("2024-03-01 08:00", "dr-a", "view_patients"),
                row("2024-03-01 09:00", "dr-a", "prescribe"),
                row("2024-03-01 10:00", "dr-b", "view_patients"),
            ],
        )
        .unwrap();

        let entries = query_audit_by_actor(&conn, "dr-a", &dt("2024-01-01 00:00")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, "prescribe");
    }

    #[test]
    fn prune_removes_only_older_entries() {
        let conn = test_db();
        insert_audit_entries(
            &conn,
            &[
                row("2023-11-01 08:00", "dr-a", "old"),
                row("2024-03-01 08:00", "dr-a", "recent"),
            ],
        )
        .unwrap();

        let deleted = prune_audit_log(&conn, &dt("2024-01-01 00:00")).unwrap();
        assert_eq!(deleted, 1);
        let left = query_audit_by_actor(&conn, "dr-a", &dt("2000-01-01 00:00")).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].1, "recent");
    }
}
