use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One planned administration of a medication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub is_taken: bool,
    /// Present iff `is_taken`.
    pub taken_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Lifecycle of a dose: `Pending -> Taken`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseState {
    Pending,
    Taken,
}

impl ScheduleEvent {
    pub fn state(&self) -> DoseState {
        if self.is_taken {
            DoseState::Taken
        } else {
            DoseState::Pending
        }
    }
}

/// Generator output, ready for bulk insertion. The store assigns ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseEventDraft {
    pub scheduled_time: NaiveDateTime,
    pub is_taken: bool,
}

/// A schedule event joined with what is to be taken and by whom.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledDose {
    #[serde(flatten)]
    pub event: ScheduleEvent,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: String,
    pub patient_id: Uuid,
    pub patient_name: String,
}
