//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table; all public functions are re-exported here.

mod audit;
mod consumption;
mod medication;
mod patient;
mod schedule;
mod user;

use rusqlite::types::ToSql;

use crate::models::PatientScope;

pub use audit::*;
pub use consumption::*;
pub use medication::*;
pub use patient::*;
pub use schedule::*;
pub use user::*;

/// Positional parameters collected while building a dynamic query.
pub(crate) type SqlParams = Vec<Box<dyn ToSql>>;

/// Append the patient-scope predicate for `patient_col` (e.g. `p.id`).
pub(crate) fn push_scope(
    sql: &mut String,
    params: &mut SqlParams,
    scope: &PatientScope,
    patient_col: &str,
    doctor_col: &str,
) {
    match scope {
        PatientScope::All => {}
        PatientScope::AssignedTo(doctor_id) => {
            params.push(Box::new(doctor_id.to_string()));
            sql.push_str(&format!(" AND {doctor_col} = ?{}", params.len()));
        }
        PatientScope::Only(Some(patient_id)) => {
            params.push(Box::new(patient_id.to_string()));
            sql.push_str(&format!(" AND {patient_col} = ?{}", params.len()));
        }
        PatientScope::Only(None) => sql.push_str(" AND 0"),
    }
}

/// Append a case-insensitive substring match over several columns.
pub(crate) fn push_search(sql: &mut String, params: &mut SqlParams, query: Option<&str>, cols: &[&str]) {
    let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        return;
    };
    params.push(Box::new(format!("%{}%", escape_like(query))));
    let idx = params.len();
    let clauses: Vec<String> = cols
        .iter()
        .map(|c| format!("{c} LIKE ?{idx} ESCAPE '\\'"))
        .collect();
    sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
}

/// Make `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub(crate) fn param_refs(params: &SqlParams) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}
