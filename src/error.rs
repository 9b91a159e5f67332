use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::registration::{RegistrationError, RepositoryError, SessionError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Task(tokio::task::JoinError),
    Store(RepositoryError),
    Registration(RegistrationError),
    Session(SessionError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Task(err) => write!(f, "background task failed: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
            AppError::Registration(err) => write!(f, "registration error: {}", err),
            AppError::Session(err) => write!(f, "session error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Task(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Registration(err) => Some(err),
            AppError::Session(err) => Some(err),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Registration(RegistrationError::NotFound(_))
            | AppError::Session(SessionError::UnknownOperator(_))
            | AppError::Store(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Registration(
                RegistrationError::InvalidStatus(_) | RegistrationError::Validation(_),
            )
            | AppError::Session(SessionError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Registration(
                RegistrationError::TransitionRejected { .. }
                | RegistrationError::ConflictOnWrite(_),
            )
            | AppError::Store(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Session(SessionError::InvalidCredentials | SessionError::Unauthorized(_)) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Registration(RegistrationError::StoreUnavailable(_))
            | AppError::Session(SessionError::Store(_))
            | AppError::Store(RepositoryError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Task(_)
            | AppError::Session(SessionError::Hashing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Workflow errors are shown to the client as-is; internal failures stay in the logs.
        let message = match &self {
            AppError::Session(SessionError::Hashing(_)) => {
                tracing::error!(error = %self, "request failed");
                "internal error".to_string()
            }
            AppError::Registration(err) => err.to_string(),
            AppError::Session(err) => err.to_string(),
            AppError::Store(err) => err.to_string(),
            other => {
                tracing::error!(error = %other, "request failed");
                "internal error".to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Task(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Store(value)
    }
}

impl From<RegistrationError> for AppError {
    fn from(value: RegistrationError) -> Self {
        Self::Registration(value)
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}
