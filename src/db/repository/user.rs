use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use uuid::Uuid;

use crate::db::{enum_column, format_datetime, uuid_column, DatabaseError};
use crate::models::enums::Role;
use crate::models::User;

const USER_COLUMNS: &str = "id, email, full_name, role, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_column(row, 0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        role: enum_column(row, 3)?,
        created_at: row.get(4)?,
    })
}

/// Fails with `ConstraintViolation` when the email is already registered.
pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, email, full_name, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id.to_string(),
            user.email,
            user.full_name,
            user.role.as_str(),
            format_datetime(&user.created_at),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            DatabaseError::ConstraintViolation(format!("user email already registered: {}", user.email))
        }
        other => DatabaseError::Sqlite(other),
    })?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users_by_role(conn: &Connection, role: Role) -> Result<Vec<User>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE role = ?1 ORDER BY full_name ASC"
    ))?;
    let users = stmt
        .query_map(params![role.as_str()], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_user, test_db};

    #[test]
    fn get_returns_inserted_user() {
        let conn = test_db();
        let user = seed_user(&conn, Role::Doctor, "dr.budi@clinic.test");
        let loaded = get_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(loaded.role, Role::Doctor);
        assert_eq!(loaded.email, "dr.budi@clinic.test");
        assert!(get_user(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_a_constraint_violation() {
        let conn = test_db();
        let first = seed_user(&conn, Role::Doctor, "dup@clinic.test");
        let second = User {
            id: Uuid::new_v4(),
            email: "DUP@clinic.test".into(),
            ..first
        };
        let result = insert_user(&conn, &second);
        assert!(matches!(result, Err(DatabaseError::ConstraintViolation(_))));
    }

    #[test]
    fn list_by_role_filters_and_sorts() {
        let conn = test_db();
        seed_user(&conn, Role::Doctor, "zaki@clinic.test");
        seed_user(&conn, Role::Doctor, "ayu@clinic.test");
        seed_user(&conn, Role::Patient, "pat@clinic.test");

        let doctors = list_users_by_role(&conn, Role::Doctor).unwrap();
        let names: Vec<_> = doctors.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(names, vec!["ayu", "zaki"]);
    }
}
