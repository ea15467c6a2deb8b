pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod error;
pub mod session;
pub mod schedule; // Dose schedule generator
pub mod compliance; // Compliance aggregator
pub mod users;
pub mod patients;
pub mod medications;
pub mod doses;
pub mod dashboard;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::ServiceError;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config::default_log_filter()`.
/// Safe to call more than once: later calls are ignored.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} core v{}", config::APP_NAME, config::APP_VERSION);
}
