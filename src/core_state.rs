//! Application state shared by every entry point.
//!
//! `CoreState` owns the database location, the signed-in session and the
//! access audit buffer. Services never reach for it implicitly: callers open
//! a connection here and pass the session and policy down explicitly.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{Duration, NaiveDateTime};
use uuid::Uuid;

use crate::config;
use crate::db::{self, format_datetime, repository};
use crate::error::ServiceError;
use crate::session::{Session, ViewPolicy};

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    db_path: PathBuf,
    /// Signed-in session. `None` until `sign_in`.
    session: RwLock<Option<Session>>,
    audit: AuditLogger,
}

impl CoreState {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            session: RwLock::new(None),
            audit: AuditLogger::new(),
        }
    }

    /// State backed by the database under the user's home directory.
    pub fn at_default_location() -> Option<Self> {
        config::database_path().map(Self::new)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a connection, creating the parent directory and schema if needed.
    pub fn open_db(&self) -> Result<rusqlite::Connection, ServiceError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ServiceError::InvalidInput(format!(
                        "cannot create data directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(db::open_database(&self.db_path)?)
    }

    // ── Session ─────────────────────────────────────────────

    /// Establish a session for an authenticated user and make it current.
    pub fn sign_in(&self, user_id: &Uuid) -> Result<Session, ServiceError> {
        let conn = self.open_db()?;
        let session = Session::establish(&conn, user_id)?;
        let mut guard = self.session.write().map_err(|_| ServiceError::LockPoisoned)?;
        *guard = Some(session.clone());
        drop(guard);

        self.log_access(&session, "sign_in", &format!("user:{user_id}"));
        tracing::info!(user_id = %user_id, role = %session.role(), "Session established");
        Ok(session)
    }

    pub fn sign_out(&self) -> Result<(), ServiceError> {
        let mut guard = self.session.write().map_err(|_| ServiceError::LockPoisoned)?;
        if let Some(session) = guard.take() {
            tracing::info!(user_id = %session.user.id, "Session closed");
        }
        Ok(())
    }

    /// The current session and its resolved policy.
    pub fn current(&self) -> Result<(Session, ViewPolicy), ServiceError> {
        let guard = self.session.read().map_err(|_| ServiceError::LockPoisoned)?;
        let session = guard.as_ref().ok_or(ServiceError::NoActiveSession)?.clone();
        let policy = ViewPolicy::for_session(&session);
        Ok((session, policy))
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.read().map(|s| s.is_some()).unwrap_or(false)
    }

    // ── Audit ───────────────────────────────────────────────

    /// Record an access. Auto-flushes to the database when the buffer is full.
    pub fn log_access(&self, session: &Session, action: &str, entity: &str) {
        let needs_flush = self.audit.log(session, action, entity);
        if needs_flush {
            if let Err(e) = self.flush_audit() {
                tracing::warn!("Auto-flush audit failed: {e}");
            }
        }
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Flush the audit buffer and prune entries past retention.
    pub fn flush_audit(&self) -> Result<usize, ServiceError> {
        let conn = self.open_db()?;
        let flushed = self.audit.flush_to_db(&conn)?;
        let cutoff = chrono::Local::now().naive_local() - Duration::days(config::AUDIT_RETENTION_DAYS);
        if let Err(e) = repository::prune_audit_log(&conn, &cutoff) {
            tracing::warn!("Failed to prune audit log: {e}");
        }
        Ok(flushed)
    }
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: NaiveDateTime,
    pub actor: Uuid,
    pub role: String,
    pub action: String,
    pub entity: String,
}

/// In-memory audit buffer, flushed to SQLite at capacity or on demand.
pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Returns `true` once the buffer has reached the flush threshold.
    pub fn log(&self, session: &Session, action: &str, entity: &str) -> bool {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(AuditEntry {
                timestamp: chrono::Local::now().naive_local(),
                actor: session.user.id,
                role: session.role().to_string(),
                action: action.to_string(),
                entity: entity.to_string(),
            });
            buf.len() >= AUDIT_BUFFER_CAPACITY
        } else {
            false
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    pub fn flush_to_db(&self, conn: &rusqlite::Connection) -> Result<usize, ServiceError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }

        let rows: Vec<repository::AuditRow> = entries
            .iter()
            .map(|e| {
                (
                    format_datetime(&e.timestamp),
                    e.actor.to_string(),
                    e.role.clone(),
                    e.action.clone(),
                    e.entity.clone(),
                )
            })
            .collect();
        repository::insert_audit_entries(conn, &rows)?;

        tracing::debug!(count = rows.len(), "Flushed audit entries to database");
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;
    use crate::test_support::seed_user;

    fn file_state() -> (tempfile::TempDir, CoreState) {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::new(dir.path().join("data").join("clinic.db"));
        (dir, state)
    }

    fn signed_in_doctor(state: &CoreState) -> Session {
        let conn = state.open_db().unwrap();
        let doctor = seed_user(&conn, Role::Doctor, "dr@clinic.test");
        state.sign_in(&doctor.id).unwrap()
    }

    #[test]
    fn current_fails_before_sign_in() {
        let (_dir, state) = file_state();
        assert!(!state.is_signed_in());
        assert!(matches!(state.current(), Err(ServiceError::NoActiveSession)));
    }

    #[test]
    fn open_db_creates_missing_directory() {
        let (_dir, state) = file_state();
        state.open_db().unwrap();
        assert!(state.db_path().exists());
    }

    #[test]
    fn sign_in_sets_current_and_sign_out_clears() {
        let (_dir, state) = file_state();
        let session = signed_in_doctor(&state);

        let (current, policy) = state.current().unwrap();
        assert_eq!(current.user.id, session.user.id);
        assert!(policy.can_prescribe);

        state.sign_out().unwrap();
        assert!(matches!(state.current(), Err(ServiceError::NoActiveSession)));
    }

    #[test]
    fn sign_in_unknown_user_fails() {
        let (_dir, state) = file_state();
        let result = state.sign_in(&Uuid::new_v4());
        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
        assert!(!state.is_signed_in());
    }

    #[test]
    fn log_access_buffers_with_actor_and_role() {
        let (_dir, state) = file_state();
        let session = signed_in_doctor(&state);
        state.log_access(&session, "view_patients", "patients");

        let entries = state.audit_entries();
        // sign_in + view_patients
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].actor, session.user.id);
        assert_eq!(entries[1].role, "doctor");
        assert_eq!(entries[1].action, "view_patients");
    }

    #[test]
    fn flush_persists_and_empties_buffer() {
        let (_dir, state) = file_state();
        let session = signed_in_doctor(&state);
        state.log_access(&session, "prescribe", "medication:1");

        assert_eq!(state.flush_audit().unwrap(), 2);
        assert!(state.audit_entries().is_empty());
        assert_eq!(state.flush_audit().unwrap(), 0);

        let conn = state.open_db().unwrap();
        let since = chrono::Local::now().naive_local() - Duration::days(1);
        let rows = repository::query_audit_by_actor(&conn, &session.user.id.to_string(), &since).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn logger_signals_flush_at_capacity() {
        let (_dir, state) = file_state();
        let session = signed_in_doctor(&state);
        let logger = AuditLogger::new();
        for i in 0..AUDIT_BUFFER_CAPACITY - 1 {
            assert!(!logger.log(&session, "view", &format!("patient:{i}")));
        }
        assert!(logger.log(&session, "view", "patient:last"));
        assert_eq!(logger.buffer_len(), AUDIT_BUFFER_CAPACITY);
    }

    #[test]
    fn auto_flush_writes_full_buffer() {
        let (_dir, state) = file_state();
        let session = signed_in_doctor(&state);
        for i in 0..AUDIT_BUFFER_CAPACITY {
            state.log_access(&session, "view", &format!("patient:{i}"));
        }
        // the 100th entry (sign_in + 99 views) triggered a flush
        assert_eq!(state.audit_entries().len(), 1);
    }
}
