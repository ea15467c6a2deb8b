//! Shared fixtures for in-module tests.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{open_memory_database, repository};
use crate::models::enums::Role;
use crate::models::{Medication, Patient, User};
use crate::schedule::{derive_end_date, generate_schedule};
use crate::session::{Session, ViewPolicy};

pub fn test_db() -> Connection {
    open_memory_database().unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

pub fn seed_user(conn: &Connection, role: Role, email: &str) -> User {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        full_name: email.split('@').next().unwrap_or(email).to_string(),
        role,
        created_at: dt("2024-01-01 00:00"),
    };
    repository::insert_user(conn, &user).unwrap();
    user
}

pub fn seed_patient(conn: &Connection, name: &str, email: &str, doctor: Option<Uuid>) -> Patient {
    let now = dt("2024-01-01 00:00");
    let patient = Patient {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: email.to_string(),
        phone: "0812000000".to_string(),
        birth_date: None,
        address: String::new(),
        medical_condition: String::new(),
        emergency_contact: String::new(),
        assigned_doctor_id: doctor,
        created_at: now,
        updated_at: now,
    };
    repository::insert_patient(conn, &patient).unwrap();
    patient
}

/// Insert an active medication together with its generated schedule.
pub fn seed_medication(
    conn: &Connection,
    patient_id: Uuid,
    name: &str,
    frequency: u32,
    duration_days: u32,
    start: &str,
) -> Medication {
    let start_date = date(start);
    let now = dt("2024-01-01 00:00");
    let med = Medication {
        id: Uuid::new_v4(),
        patient_id,
        name: name.to_string(),
        dosage: "500mg".to_string(),
        frequency,
        duration_days,
        instructions: "After meals".to_string(),
        prescribed_by: "dr".to_string(),
        start_date,
        end_date: derive_end_date(start_date, duration_days).unwrap(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    repository::insert_medication(conn, &med).unwrap();
    let drafts = generate_schedule(&med).unwrap();
    repository::insert_schedule_events(conn, &med.id, &drafts, &now).unwrap();
    med
}

pub fn session_for(conn: &Connection, user: &User) -> (Session, ViewPolicy) {
    let session = Session::establish(conn, &user.id).unwrap();
    let policy = ViewPolicy::for_session(&session);
    (session, policy)
}
