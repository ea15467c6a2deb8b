//! Explicit session and role-based view policy.
//!
//! A `Session` is established once per authenticated request and passed by
//! reference. `ViewPolicy` resolves the session's role into capabilities and
//! a patient scope; services consult the policy and never match on roles.

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository;
use crate::error::ServiceError;
use crate::models::enums::Role;
use crate::models::{PatientScope, User};

// ═══════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: User,
    /// Linked patient record, for patient-role accounts only.
    pub patient_id: Option<Uuid>,
}

impl Session {
    /// Load the user profile and, for patients, the linked patient record.
    ///
    /// A patient account with no matching record still gets a session; its
    /// scope simply matches nothing.
    pub fn establish(conn: &Connection, user_id: &Uuid) -> Result<Self, ServiceError> {
        let user = repository::get_user(conn, user_id)?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;

        let patient_id = match user.role {
            Role::Patient => {
                let linked = repository::find_patient_by_email(conn, &user.email)?;
                if linked.is_none() {
                    tracing::warn!(user_id = %user.id, "Patient account has no linked patient record");
                }
                linked.map(|p| p.id)
            }
            Role::Administrator | Role::Doctor => None,
        };

        Ok(Self { user, patient_id })
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}

// ═══════════════════════════════════════════════════════════
// View policy
// ═══════════════════════════════════════════════════════════

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    EditPatients,
    DeletePatients,
    Prescribe,
    RecordDoses,
    ManageDoctors,
}

impl Capability {
    fn action(self) -> &'static str {
        match self {
            Self::EditPatients => "edit patients",
            Self::DeletePatients => "delete patients",
            Self::Prescribe => "prescribe medications",
            Self::RecordDoses => "record doses",
            Self::ManageDoctors => "manage doctors",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewPolicy {
    pub can_edit_patients: bool,
    pub can_delete_patients: bool,
    pub can_prescribe: bool,
    pub can_view_all_patients: bool,
    pub can_record_doses: bool,
    pub can_manage_doctors: bool,
    pub patient_scope: PatientScope,
}

impl ViewPolicy {
    pub fn for_session(session: &Session) -> Self {
        match session.role() {
            Role::Administrator => Self {
                can_edit_patients: true,
                can_delete_patients: true,
                can_prescribe: true,
                can_view_all_patients: true,
                can_record_doses: false,
                can_manage_doctors: true,
                patient_scope: PatientScope::All,
            },
            Role::Doctor => Self {
                can_edit_patients: true,
                can_delete_patients: false,
                can_prescribe: true,
                can_view_all_patients: false,
                can_record_doses: true,
                can_manage_doctors: false,
                patient_scope: PatientScope::AssignedTo(session.user.id),
            },
            Role::Patient => Self {
                can_edit_patients: false,
                can_delete_patients: false,
                can_prescribe: false,
                can_view_all_patients: false,
                can_record_doses: true,
                can_manage_doctors: false,
                patient_scope: PatientScope::Only(session.patient_id),
            },
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::EditPatients => self.can_edit_patients,
            Capability::DeletePatients => self.can_delete_patients,
            Capability::Prescribe => self.can_prescribe,
            Capability::RecordDoses => self.can_record_doses,
            Capability::ManageDoctors => self.can_manage_doctors,
        }
    }

    /// `Forbidden` unless the capability is granted.
    pub fn require(&self, capability: Capability) -> Result<(), ServiceError> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden {
                action: capability.action(),
            })
        }
    }

    /// The doctor new patients are assigned to, if the caller is a doctor.
    pub fn assigning_doctor(&self) -> Option<Uuid> {
        match self.patient_scope {
            PatientScope::AssignedTo(doctor_id) => Some(doctor_id),
            PatientScope::All | PatientScope::Only(_) => None,
        }
    }
}
