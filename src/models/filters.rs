use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

/// Which patients' rows a query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum PatientScope {
    All,
    /// Patients whose `assigned_doctor_id` is the given doctor.
    AssignedTo(Uuid),
    /// A single patient record; `None` when the account has no linked record.
    Only(Option<Uuid>),
}

#[derive(Debug, Clone)]
pub struct PatientFilter {
    pub scope: PatientScope,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MedicationFilter {
    pub scope: PatientScope,
    pub active_only: bool,
    pub search: Option<String>,
}

/// Half-open `[from, to)` range over `scheduled_time`.
#[derive(Debug, Clone)]
pub struct ScheduleFilter {
    pub scope: PatientScope,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub active_only: bool,
}
