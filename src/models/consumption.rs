use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ConsumptionStatus;

/// Append-only record of actual versus scheduled consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionLog {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub medication_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub scheduled_time: NaiveDateTime,
    pub actual_time: Option<NaiveDateTime>,
    pub status: ConsumptionStatus,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}
