use crate::cli::ServeArgs;
use crate::infra::{bootstrap_operator, open_store, session_policy, AppState};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use registrar::config::AppConfig;
use registrar::error::AppError;
use registrar::telemetry;
use registrar::workflows::registration::{
    AdminSessions, LogNotifier, RegistrationService, RegistrationState,
};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_store(&config.storage)?;
    let sessions = AdminSessions::new(store.clone(), session_policy(&config.admin));
    bootstrap_operator(&sessions, &config.admin)?;

    let service = RegistrationService::new(
        store,
        Arc::new(LogNotifier),
        config.registration.session_year,
    );
    let state = RegistrationState::new(Arc::new(service), Arc::new(sessions))
        .trusting_proxy(config.server.trust_proxy);

    let app = with_registration_routes(state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        trust_proxy = config.server.trust_proxy,
        database = %config.storage.database_path.display(),
        session_year = config.registration.session_year,
        "registrar ready"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
