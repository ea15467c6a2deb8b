use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "MedReminder";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hour of the first dose of every dosing day.
pub const FIRST_DOSE_HOUR: u32 = 8;

/// Latest hour a generated dose may fall on, same calendar day.
pub const LAST_DOSE_HOUR: u32 = 23;

/// A dose marked taken later than this after its slot is logged as late.
pub const LATE_GRACE_MINUTES: i64 = 60;

/// Window used by the administrator compliance rate.
pub const COMPLIANCE_WINDOW_DAYS: u32 = 30;

/// Audit entries older than this are pruned on flush.
pub const AUDIT_RETENTION_DAYS: i64 = 90;

/// Get the application data directory
/// ~/MedReminder/ on all platforms. `None` if no home directory can be resolved.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_NAME))
}

/// Default location of the clinic database.
pub fn database_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("clinic.db"))
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "medreminder_lib=debug,info"
    } else {
        "medreminder_lib=info,warn"
    }
}
