use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::catalog::StatusCatalog;
use super::domain::{
    Application, NewApplication, OperatorId, RegistrationCode, RegistrationSubmission, SessionTag,
    Status, StatusChange, StatusCode, TransitionRecord,
};
use super::identity::IdentityGenerator;
use super::notify::{IntakeNotice, IntakeNotifier};
use super::policy::{PermissiveWorkflow, TransitionPolicy};
use super::repository::{ApplicationPage, ApplicationQuery, RegistrationStore, RepositoryError};

/// Application plus its resolved status and full audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    pub application: Application,
    pub status: Status,
    pub history: Vec<TransitionRecord>,
}

/// Per-status tallies for the dashboard header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationStats {
    pub total: u64,
    pub by_status: Vec<StatusCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: StatusCode,
    pub count: u64,
}

/// Service composing intake, the status catalog, the transition policy and the audit trail.
pub struct RegistrationService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    identities: IdentityGenerator<S>,
    catalog: StatusCatalog<S>,
    policy: Arc<dyn TransitionPolicy>,
    session_year: i32,
}

impl<S, N> RegistrationService<S, N>
where
    S: RegistrationStore + 'static,
    N: IntakeNotifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, session_year: i32) -> Self {
        Self::with_policy(store, notifier, session_year, Arc::new(PermissiveWorkflow))
    }

    pub fn with_policy(
        store: Arc<S>,
        notifier: Arc<N>,
        session_year: i32,
        policy: Arc<dyn TransitionPolicy>,
    ) -> Self {
        Self {
            identities: IdentityGenerator::new(store.clone()),
            catalog: StatusCatalog::new(store.clone()),
            store,
            notifier,
            policy,
            session_year,
        }
    }

    pub fn session_year(&self) -> i32 {
        self.session_year
    }

    pub fn catalog(&self) -> &StatusCatalog<S> {
        &self.catalog
    }

    /// Persist a new application under a freshly issued identifier with the default status.
    pub fn register(
        &self,
        submission: RegistrationSubmission,
    ) -> Result<Application, RegistrationError> {
        validate_submission(&submission)?;
        let status = self.catalog.default_status().map_err(|err| match err {
            RepositoryError::NotFound => {
                RegistrationError::InvalidStatus("no active status in catalog".to_string())
            }
            other => other.into(),
        })?;

        let RegistrationSubmission {
            applicant,
            finances,
            payload,
        } = submission;
        let session = SessionTag::for_year(self.session_year);

        let mut attempt = 0;
        let application = loop {
            attempt += 1;
            let code = self
                .identities
                .generate(&applicant.surname, self.session_year)?;
            let new = NewApplication {
                code,
                session: session.clone(),
                status: status.code.clone(),
                created_at: Utc::now(),
                applicant: applicant.clone(),
                finances: finances.clone(),
                payload: payload.clone(),
            };
            match self.store.insert_application(new) {
                Ok(application) => break application,
                Err(RepositoryError::Conflict(reason)) if attempt < 2 => {
                    warn!(%reason, "identifier collision on intake, regenerating once");
                }
                Err(err) => return Err(err.into()),
            }
        };

        info!(
            code = %application.code,
            session = application.session.as_str(),
            status = %application.status,
            "registration received"
        );

        let notice = IntakeNotice::from_application(&application);
        if let Err(err) = self.notifier.notify(notice) {
            warn!(code = %application.code, error = %err, "intake notification failed");
        }

        Ok(application)
    }

    /// Move an application to `new_status`, recording who did it and why.
    pub fn transition(
        &self,
        code: &RegistrationCode,
        new_status: &StatusCode,
        reason: Option<String>,
        actor: OperatorId,
        origin: &str,
    ) -> Result<TransitionRecord, RegistrationError> {
        let application = self
            .store
            .fetch_application(code)?
            .ok_or_else(|| RegistrationError::NotFound(code.to_string()))?;

        let target = self.catalog.resolve(new_status).map_err(|err| match err {
            RepositoryError::NotFound => RegistrationError::InvalidStatus(new_status.to_string()),
            other => other.into(),
        })?;

        if !self
            .policy
            .is_transition_allowed(&application.status, &target.code)
        {
            return Err(RegistrationError::TransitionRejected {
                from: application.status,
                to: target.code,
            });
        }

        let reason = reason
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let record = self.store.apply_transition(StatusChange {
            application: application.id,
            previous: application.status,
            next: target.code,
            reason,
            actor,
            origin: origin.to_string(),
            at: Utc::now(),
        })?;

        info!(
            code = %record.application,
            transition = %record.summary(),
            actor = record.actor.0,
            origin = %record.origin,
            "status updated"
        );
        Ok(record)
    }

    /// Audit trail for one application, newest first.
    pub fn history(
        &self,
        code: &RegistrationCode,
    ) -> Result<Vec<TransitionRecord>, RegistrationError> {
        let application = self
            .store
            .fetch_application(code)?
            .ok_or_else(|| RegistrationError::NotFound(code.to_string()))?;
        Ok(self.store.history(application.id)?)
    }

    pub fn get(&self, code: &RegistrationCode) -> Result<Application, RegistrationError> {
        self.store
            .fetch_application(code)?
            .ok_or_else(|| RegistrationError::NotFound(code.to_string()))
    }

    pub fn detail(&self, code: &RegistrationCode) -> Result<ApplicationDetail, RegistrationError> {
        let application = self.get(code)?;
        let status = self.catalog.resolve(&application.status)?;
        let history = self.store.history(application.id)?;
        Ok(ApplicationDetail {
            application,
            status,
            history,
        })
    }

    pub fn search(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RegistrationError> {
        Ok(self.store.search_applications(query)?)
    }

    /// Active statuses for selection controls.
    pub fn active_statuses(&self) -> Result<Vec<Status>, RegistrationError> {
        Ok(self.catalog.list(true)?)
    }

    pub fn stats(&self) -> Result<RegistrationStats, RegistrationError> {
        let by_status: Vec<StatusCount> = self
            .store
            .status_counts()?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        let total = by_status.iter().map(|entry| entry.count).sum();
        Ok(RegistrationStats { total, by_status })
    }
}

fn validate_submission(submission: &RegistrationSubmission) -> Result<(), RegistrationError> {
    let applicant = &submission.applicant;
    if applicant.surname.trim().is_empty() {
        return Err(RegistrationError::Validation("surname is required".to_string()));
    }
    if applicant.given_name.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "given name is required".to_string(),
        ));
    }
    let email = applicant.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(RegistrationError::Validation(
            "a valid email is required".to_string(),
        ));
    }
    Ok(())
}

/// Error raised by the registration service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("registration not found: {0}")]
    NotFound(String),
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    #[error("transition from {from} to {to} is not allowed")]
    TransitionRejected { from: StatusCode, to: StatusCode },
    #[error("write conflict: {0}")]
    ConflictOnWrite(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("invalid submission: {0}")]
    Validation(String),
}

impl From<RepositoryError> for RegistrationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(reason) => RegistrationError::ConflictOnWrite(reason),
            RepositoryError::NotFound => RegistrationError::NotFound("record".to_string()),
            RepositoryError::Unavailable(reason) => RegistrationError::StoreUnavailable(reason),
        }
    }
}
