//! User profiles for identities authenticated upstream.

use rusqlite::Connection;

use crate::db::repository;
use crate::error::ServiceError;
use crate::models::enums::Role;
use crate::models::{NewUser, User};
use crate::session::{Capability, ViewPolicy};

/// Create the profile row for an authenticated identity.
pub fn register_user(
    conn: &Connection,
    input: NewUser,
    now: chrono::NaiveDateTime,
) -> Result<User, ServiceError> {
    let email = input.email.trim().to_string();
    let full_name = input.full_name.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(ServiceError::InvalidInput(format!("'{email}' is not an email address")));
    }
    if full_name.is_empty() {
        return Err(ServiceError::InvalidInput("full name is required".into()));
    }

    let user = User {
        id: input.id,
        email,
        full_name,
        role: input.role,
        created_at: now,
    };
    repository::insert_user(conn, &user)?;
    tracing::info!(user_id = %user.id, role = %user.role, "Registered user");
    Ok(user)
}

/// Doctors on staff, by name. Administrators only.
pub fn list_doctors(conn: &Connection, policy: &ViewPolicy) -> Result<Vec<User>, ServiceError> {
    policy.require(Capability::ManageDoctors)?;
    Ok(repository::list_users_by_role(conn, Role::Doctor)?)
}
