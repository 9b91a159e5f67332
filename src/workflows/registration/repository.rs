use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, NewApplication, Operator, OperatorId, RegistrationCode, Status,
    StatusChange, StatusCode, TransitionRecord,
};

/// Durable counter bucket: one sequence per (session year, surname prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifierBucket {
    pub year: i32,
    pub prefix: String,
}

impl IdentifierBucket {
    pub fn key(&self) -> String {
        format!("{}_{}", self.year, self.prefix)
    }
}

/// Filters for the admin application listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationQuery {
    #[serde(default)]
    pub status: Option<StatusCode>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "ApplicationQuery::default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl ApplicationQuery {
    pub const MAX_LIMIT: usize = 100;

    fn default_limit() -> usize {
        20
    }

    /// Page size clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }
}

impl Default for ApplicationQuery {
    fn default() -> Self {
        Self {
            status: None,
            session: None,
            search: None,
            limit: Self::default_limit(),
            offset: 0,
        }
    }
}

/// One page of the listing plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationPage {
    pub total: u64,
    pub applications: Vec<Application>,
}

/// Storage seam for applications, the status catalog, counters and the audit trail.
pub trait RegistrationStore: Send + Sync {
    /// Atomically increments the bucket counter and returns the new value.
    fn next_counter(&self, bucket: &IdentifierBucket) -> Result<u32, RepositoryError>;
    fn insert_application(&self, new: NewApplication) -> Result<Application, RepositoryError>;
    fn fetch_application(
        &self,
        code: &RegistrationCode,
    ) -> Result<Option<Application>, RepositoryError>;
    fn search_applications(
        &self,
        query: &ApplicationQuery,
    ) -> Result<ApplicationPage, RepositoryError>;
    fn list_statuses(&self, active_only: bool) -> Result<Vec<Status>, RepositoryError>;
    fn fetch_status(&self, code: &StatusCode) -> Result<Option<Status>, RepositoryError>;
    fn set_status_active(&self, code: &StatusCode, active: bool) -> Result<(), RepositoryError>;
    /// Writes the status update and its audit entry in one unit. Fails with
    /// `Conflict` without writing when the stored status no longer equals
    /// `change.previous`.
    fn apply_transition(&self, change: StatusChange) -> Result<TransitionRecord, RepositoryError>;
    /// Audit entries for one application, newest first.
    fn history(&self, application: ApplicationId) -> Result<Vec<TransitionRecord>, RepositoryError>;
    fn status_counts(&self) -> Result<Vec<(StatusCode, u64)>, RepositoryError>;
}

/// Operator row including the stored password digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCredentials {
    pub operator: Operator,
    pub password_hash: String,
}

/// Values needed to create an operator account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperator {
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update of an operator account; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub password_hash: Option<String>,
    pub active: Option<bool>,
}

/// Issued bearer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    pub operator: OperatorId,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Storage seam for admin accounts and their bearer sessions.
pub trait OperatorStore: Send + Sync {
    fn insert_operator(&self, new: NewOperator) -> Result<Operator, RepositoryError>;
    fn operator_by_email(&self, email: &str)
        -> Result<Option<OperatorCredentials>, RepositoryError>;
    fn operator(&self, id: OperatorId) -> Result<Option<Operator>, RepositoryError>;
    fn list_operators(&self) -> Result<Vec<Operator>, RepositoryError>;
    /// Fails with `NotFound` when no operator has `id`.
    fn update_operator(
        &self,
        id: OperatorId,
        update: OperatorUpdate,
    ) -> Result<Operator, RepositoryError>;
    /// Removes the account and its sessions. Fails with `NotFound` when no operator has `id`.
    fn delete_operator(&self, id: OperatorId) -> Result<(), RepositoryError>;
    fn operator_count(&self) -> Result<u64, RepositoryError>;
    fn record_login(&self, id: OperatorId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
    fn insert_session(&self, session: SessionRecord) -> Result<(), RepositoryError>;
    fn session(&self, token: &str) -> Result<Option<SessionRecord>, RepositoryError>;
    fn delete_session(&self, token: &str) -> Result<(), RepositoryError>;
    /// Drops sessions whose expiry is at or before `now`; returns how many were removed.
    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict(value.to_string())
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
            other => RepositoryError::Unavailable(other.to_string()),
        }
    }
}
