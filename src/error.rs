use thiserror::Error;

use crate::db::DatabaseError;
use crate::schedule::ScheduleError;

/// Errors surfaced by the application services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not permitted: {action}")]
    Forbidden { action: &'static str },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    #[error("Dose {0} has already been taken")]
    AlreadyTaken(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("No active session")]
    NoActiveSession,

    #[error("Internal lock error")]
    LockPoisoned,
}

impl From<ScheduleError> for ServiceError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
        }
    }
}

impl ServiceError {
    pub(crate) fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Database(DatabaseError::Sqlite(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_errors_become_invalid_input() {
        let err: ServiceError = ScheduleError::InvalidInput("frequency must be at least 1".into()).into();
        assert!(matches!(err, ServiceError::InvalidInput(ref m) if m.contains("frequency")));
    }

    #[test]
    fn forbidden_names_the_action() {
        let err = ServiceError::Forbidden { action: "delete patient" };
        assert_eq!(err.to_string(), "Not permitted: delete patient");
    }

    #[test]
    fn not_found_formats_entity() {
        let err = ServiceError::not_found("Medication", "abc");
        assert_eq!(err.to_string(), "Medication not found: abc");
    }
}
