use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    Operator, OperatorId, RegistrationCode, RegistrationSubmission, StatusCode as Code,
};
use super::notify::IntakeNotifier;
use super::repository::{ApplicationQuery, OperatorStore, RegistrationStore};
use super::service::{RegistrationError, RegistrationService};
use super::session::{AdminSessions, OperatorChanges, SessionError};
use crate::error::AppError;

/// Shared handler state: the workflow service and the session layer over one store.
pub struct RegistrationState<S, N> {
    pub service: Arc<RegistrationService<S, N>>,
    pub sessions: Arc<AdminSessions<S>>,
    /// Take the client address from `X-Forwarded-For` instead of the socket peer.
    pub trust_proxy: bool,
}

impl<S, N> RegistrationState<S, N> {
    pub fn new(service: Arc<RegistrationService<S, N>>, sessions: Arc<AdminSessions<S>>) -> Self {
        Self {
            service,
            sessions,
            trust_proxy: false,
        }
    }

    pub fn trusting_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}

impl<S, N> Clone for RegistrationState<S, N> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            sessions: self.sessions.clone(),
            trust_proxy: self.trust_proxy,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Runs a synchronous store call on the blocking pool so SQLite I/O and bcrypt never stall
/// the async workers. A panicked or cancelled task surfaces as [`AppError::Task`].
pub async fn run_blocking<T, E, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await?.map_err(Into::into)
}

#[derive(Debug, Deserialize)]
pub struct CreateOperatorRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Router builder exposing public intake and the authenticated admin endpoints.
pub fn registration_router<S, N>(state: RegistrationState<S, N>) -> Router
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    Router::new()
        .route("/api/v1/registrations", post(register_handler::<S, N>))
        .route("/api/v1/admin/login", post(login_handler::<S, N>))
        .route("/api/v1/admin/verify", get(verify_handler::<S, N>))
        .route("/api/v1/admin/logout", post(logout_handler::<S, N>))
        .route("/api/v1/admin/stats", get(stats_handler::<S, N>))
        .route(
            "/api/v1/admin/registrations",
            get(list_registrations_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/registrations/:code",
            get(registration_detail_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/registrations/:code/status",
            patch(transition_handler::<S, N>),
        )
        .route("/api/v1/admin/statuses", get(statuses_handler::<S, N>))
        .route(
            "/api/v1/admin/operators",
            get(list_operators_handler::<S, N>).post(create_operator_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/operators/:id",
            patch(update_operator_handler::<S, N>).delete(delete_operator_handler::<S, N>),
        )
        .with_state(state)
}

pub(crate) async fn register_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    Json(submission): Json<RegistrationSubmission>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    let service = state.service.clone();
    let application = run_blocking(move || service.register(submission)).await?;
    let payload = json!({
        "code": application.code,
        "session": application.session,
        "status": application.status,
    });
    Ok((StatusCode::CREATED, Json(payload)).into_response())
}

pub(crate) async fn login_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    let origin = origin_address(&headers, connect.as_ref(), state.trust_proxy);
    let sessions = state.sessions.clone();
    let grant = run_blocking(move || {
        sessions.login(&request.email, &request.password, request.remember, &origin)
    })
    .await?;
    Ok((StatusCode::OK, Json(grant)).into_response())
}

pub(crate) async fn verify_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    let operator = authenticate(&state, &headers).await?;
    Ok((StatusCode::OK, Json(operator)).into_response())
}

pub(crate) async fn logout_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let token = bearer_token(&headers).unwrap_or_default().to_string();
    let sessions = state.sessions.clone();
    run_blocking(move || sessions.logout(&token)).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "logged_out" }))).into_response())
}

pub(crate) async fn stats_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let service = state.service.clone();
    let stats = run_blocking(move || service.stats()).await?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}

pub(crate) async fn list_registrations_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
    Query(query): Query<ApplicationQuery>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let service = state.service.clone();
    let page = run_blocking(move || service.search(&query)).await?;
    Ok((StatusCode::OK, Json(page)).into_response())
}

pub(crate) async fn registration_detail_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let service = state.service.clone();
    let detail = run_blocking(move || service.detail(&RegistrationCode(code))).await?;
    Ok((StatusCode::OK, Json(detail)).into_response())
}

pub(crate) async fn transition_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Path(code): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    let operator = authenticate(&state, &headers).await?;
    let status = request.status.trim().to_string();
    if status.is_empty() {
        return Err(RegistrationError::InvalidStatus("status is required".to_string()).into());
    }

    let origin = origin_address(&headers, connect.as_ref(), state.trust_proxy);
    let service = state.service.clone();
    let record = run_blocking(move || {
        service.transition(
            &RegistrationCode(code),
            &Code::new(status),
            request.reason,
            operator.id,
            &origin,
        )
    })
    .await?;
    let payload = json!({
        "previous_status": record.previous_status,
        "new_status": record.new_status,
        "summary": record.summary(),
        "record": record,
    });
    Ok((StatusCode::OK, Json(payload)).into_response())
}

pub(crate) async fn statuses_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let service = state.service.clone();
    let statuses = run_blocking(move || service.active_statuses()).await?;
    Ok((StatusCode::OK, Json(json!({ "statuses": statuses }))).into_response())
}

pub(crate) async fn list_operators_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let sessions = state.sessions.clone();
    let operators = run_blocking(move || sessions.list_operators()).await?;
    Ok((StatusCode::OK, Json(json!({ "operators": operators }))).into_response())
}

pub(crate) async fn create_operator_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
    Json(request): Json<CreateOperatorRequest>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let sessions = state.sessions.clone();
    let operator = run_blocking(move || {
        sessions.create_operator(
            &request.email,
            &request.password,
            &request.display_name,
            request.role.as_deref(),
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(operator)).into_response())
}

pub(crate) async fn update_operator_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(changes): Json<OperatorChanges>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    authenticate(&state, &headers).await?;
    let sessions = state.sessions.clone();
    let operator = run_blocking(move || sessions.update_operator(OperatorId(id), changes)).await?;
    Ok((StatusCode::OK, Json(operator)).into_response())
}

pub(crate) async fn delete_operator_handler<S, N>(
    State(state): State<RegistrationState<S, N>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    let actor = authenticate(&state, &headers).await?;
    let sessions = state.sessions.clone();
    run_blocking(move || sessions.delete_operator(actor.id, OperatorId(id))).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "deleted", "id": id }))).into_response())
}

async fn authenticate<S, N>(
    state: &RegistrationState<S, N>,
    headers: &HeaderMap,
) -> Result<Operator, AppError>
where
    S: RegistrationStore + OperatorStore + 'static,
    N: IntakeNotifier + 'static,
{
    let token = bearer_token(headers)
        .ok_or(SessionError::Unauthorized("missing bearer token"))?
        .to_string();
    let sessions = state.sessions.clone();
    run_blocking(move || sessions.verify(&token)).await
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The socket peer, or `unknown` when the server runs without `ConnectInfo`. The first
/// `X-Forwarded-For` hop is only honoured behind a trusted proxy; clients can forge it.
pub(crate) fn origin_address(
    headers: &HeaderMap,
    connect: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> String {
    let forwarded = trust_proxy
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
        .flatten();
    forwarded
        .or_else(|| connect.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().expect("header value"),
        );
        headers
    }

    #[test]
    fn forwarded_header_needs_trusted_proxy() {
        let peer = ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40000)));

        assert_eq!(
            origin_address(&forwarded_headers(), Some(&peer), false),
            "192.0.2.10"
        );
        assert_eq!(
            origin_address(&forwarded_headers(), Some(&peer), true),
            "203.0.113.7"
        );
        assert_eq!(origin_address(&HeaderMap::new(), Some(&peer), true), "192.0.2.10");
        assert_eq!(origin_address(&forwarded_headers(), None, false), "unknown");
    }

    #[tokio::test]
    async fn blocking_work_errors_and_panics_become_app_errors() {
        let failed = run_blocking(|| -> Result<(), SessionError> {
            Err(SessionError::InvalidCredentials)
        })
        .await
        .expect_err("work fails");
        assert_eq!(failed.status_code(), StatusCode::UNAUTHORIZED);

        let panicked = run_blocking(|| -> Result<(), SessionError> { panic!("store crashed") })
            .await
            .expect_err("work panics");
        assert!(matches!(panicked, AppError::Task(_)));
        assert_eq!(panicked.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
