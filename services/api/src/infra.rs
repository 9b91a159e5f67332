use chrono::Duration;
use metrics_exporter_prometheus::PrometheusHandle;
use registrar::config::{AdminConfig, StorageConfig};
use registrar::error::AppError;
use registrar::workflows::registration::{AdminSessions, SessionPolicy, SqliteRegistrationStore};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn session_policy(config: &AdminConfig) -> SessionPolicy {
    SessionPolicy {
        token_ttl: Duration::hours(i64::from(config.token_ttl_hours.max(1))),
        remember_ttl: Duration::days(i64::from(config.remember_ttl_days.max(1))),
        password_cost: config.password_cost,
    }
}

/// Opens the configured database, creating its parent directory on first run.
pub(crate) fn open_store(config: &StorageConfig) -> Result<Arc<SqliteRegistrationStore>, AppError> {
    if let Some(parent) = config
        .database_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteRegistrationStore::open(&config.database_path)?;
    Ok(Arc::new(store))
}

/// Seeds the first operator from `REGISTRAR_BOOTSTRAP_*` when the account table is empty.
pub(crate) fn bootstrap_operator(
    sessions: &AdminSessions<SqliteRegistrationStore>,
    config: &AdminConfig,
) -> Result<(), AppError> {
    let (Some(email), Some(password)) = (&config.bootstrap_email, &config.bootstrap_password)
    else {
        if sessions.list_operators()?.is_empty() {
            warn!("no operators configured; set REGISTRAR_BOOTSTRAP_EMAIL and REGISTRAR_BOOTSTRAP_PASSWORD");
        }
        return Ok(());
    };

    if let Some(operator) = sessions.bootstrap_admin(email, password, "Administrator")? {
        info!(email = %operator.email, "bootstrap operator created");
    }
    Ok(())
}
