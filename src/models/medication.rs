use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A drug prescribed to one patient.
///
/// `end_date` is always `start_date + duration_days`; `is_active = false`
/// is the logical delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub name: String,
    pub dosage: String,
    /// Doses per calendar day.
    pub frequency: u32,
    pub duration_days: u32,
    pub instructions: String,
    pub prescribed_by: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Prescription form input. Dates arrive as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Deserialize)]
pub struct MedicationInput {
    pub patient_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub frequency: u32,
    pub duration_days: u32,
    pub instructions: String,
    pub start_date: Option<String>,
}

/// A medication row joined with its patient's name, as listed in tables.
#[derive(Debug, Clone, Serialize)]
pub struct MedicationListItem {
    #[serde(flatten)]
    pub medication: Medication,
    pub patient_name: String,
}
