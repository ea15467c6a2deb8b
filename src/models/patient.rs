use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub address: String,
    pub medical_condition: String,
    pub emergency_contact: String,
    pub assigned_doctor_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Editable patient fields, as submitted by the patient form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientInput {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub address: String,
    pub medical_condition: String,
    pub emergency_contact: String,
}
