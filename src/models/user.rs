use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

/// Profile row for an identity authenticated upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Identity id issued by the authentication provider.
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}
