use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::{json, Value};

use crate::workflows::registration::domain::{
    ApplicantIdentity, Application, ApplicationId, FinancialDetails, NewApplication, Operator,
    OperatorId, RegistrationCode, RegistrationSubmission, Status, StatusChange, StatusCode,
    TransitionRecord,
};
use crate::workflows::registration::notify::{
    IntakeNotice, IntakeNotifier, NotifyError, RecordingNotifier,
};
use crate::workflows::registration::repository::{
    ApplicationPage, ApplicationQuery, IdentifierBucket, NewOperator, OperatorCredentials,
    OperatorStore, OperatorUpdate, RegistrationStore, RepositoryError, SessionRecord,
};
use crate::workflows::registration::router::RegistrationState;
use crate::workflows::registration::service::RegistrationService;
use crate::workflows::registration::session::{AdminSessions, SessionPolicy};
use crate::workflows::registration::sqlite::SqliteRegistrationStore;

pub(super) const SESSION_YEAR: i32 = 2026;
pub(super) const ADMIN_EMAIL: &str = "office@example.org";
pub(super) const ADMIN_PASSWORD: &str = "correct horse battery";

pub(super) fn submission(surname: &str) -> RegistrationSubmission {
    let mut payload = serde_json::Map::new();
    payload.insert("program".to_string(), json!("gap-year"));
    payload.insert("documents".to_string(), json!({ "passport": "passport.pdf" }));

    RegistrationSubmission {
        applicant: ApplicantIdentity {
            surname: surname.to_string(),
            given_name: "Noa".to_string(),
            email: format!("{}@example.org", surname.to_lowercase().replace(' ', "")),
            city: Some("Lyon".to_string()),
            country: Some("France".to_string()),
            ..ApplicantIdentity::default()
        },
        finances: FinancialDetails {
            monthly_income: Some(1450.0),
            scholarship_requested: Some(3000.0),
            ..FinancialDetails::default()
        },
        payload,
    }
}

pub(super) fn store() -> Arc<SqliteRegistrationStore> {
    Arc::new(SqliteRegistrationStore::in_memory().expect("in-memory store opens"))
}

pub(super) fn build_service() -> (
    RegistrationService<SqliteRegistrationStore, RecordingNotifier>,
    Arc<SqliteRegistrationStore>,
    Arc<RecordingNotifier>,
) {
    let store = store();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = RegistrationService::new(store.clone(), notifier.clone(), SESSION_YEAR);
    (service, store, notifier)
}

/// Lowest bcrypt cost; keeps password hashing fast under test.
pub(super) fn test_policy() -> SessionPolicy {
    SessionPolicy {
        password_cost: 4,
        ..SessionPolicy::default()
    }
}

pub(super) fn build_state() -> (
    RegistrationState<SqliteRegistrationStore, RecordingNotifier>,
    Arc<SqliteRegistrationStore>,
) {
    let (service, store, _) = build_service();
    let sessions = AdminSessions::new(store.clone(), test_policy());
    sessions
        .bootstrap_admin(ADMIN_EMAIL, ADMIN_PASSWORD, "Office")
        .expect("bootstrap admin");
    let state = RegistrationState::new(Arc::new(service), Arc::new(sessions));
    (state, store)
}

pub(super) fn admin_token(
    state: &RegistrationState<SqliteRegistrationStore, RecordingNotifier>,
) -> String {
    state
        .sessions
        .login(ADMIN_EMAIL, ADMIN_PASSWORD, false, "127.0.0.1")
        .expect("admin login")
        .token
}

pub(super) fn code(value: &str) -> RegistrationCode {
    RegistrationCode(value.to_string())
}

pub(super) fn status(value: &str) -> StatusCode {
    StatusCode::new(value)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) struct FailingNotifier;

impl IntakeNotifier for FailingNotifier {
    fn notify(&self, _notice: IntakeNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}

/// Delegates to SQLite but reports a write conflict on the first `failures` inserts.
pub(super) struct ConflictingInsertStore {
    pub(super) inner: SqliteRegistrationStore,
    failures: AtomicUsize,
}

impl ConflictingInsertStore {
    pub(super) fn new(failures: usize) -> Self {
        Self {
            inner: SqliteRegistrationStore::in_memory().expect("in-memory store opens"),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl RegistrationStore for ConflictingInsertStore {
    fn next_counter(&self, bucket: &IdentifierBucket) -> Result<u32, RepositoryError> {
        self.inner.next_counter(bucket)
    }

    fn insert_application(&self, new: NewApplication) -> Result<Application, RepositoryError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Conflict(format!(
                "UNIQUE constraint failed: applications.code ({})",
                new.code
            )));
        }
        self.inner.insert_application(new)
    }

    fn fetch_application(
        &self,
        code: &RegistrationCode,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.fetch_application(code)
    }

    fn search_applications(
        &self,
        query: &ApplicationQuery,
    ) -> Result<ApplicationPage, RepositoryError> {
        self.inner.search_applications(query)
    }

    fn list_statuses(&self, active_only: bool) -> Result<Vec<Status>, RepositoryError> {
        self.inner.list_statuses(active_only)
    }

    fn fetch_status(&self, code: &StatusCode) -> Result<Option<Status>, RepositoryError> {
        self.inner.fetch_status(code)
    }

    fn set_status_active(&self, code: &StatusCode, active: bool) -> Result<(), RepositoryError> {
        self.inner.set_status_active(code, active)
    }

    fn apply_transition(&self, change: StatusChange) -> Result<TransitionRecord, RepositoryError> {
        self.inner.apply_transition(change)
    }

    fn history(&self, application: ApplicationId) -> Result<Vec<TransitionRecord>, RepositoryError> {
        self.inner.history(application)
    }

    fn status_counts(&self) -> Result<Vec<(StatusCode, u64)>, RepositoryError> {
        self.inner.status_counts()
    }
}

/// Store whose backing database cannot be reached.
pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl RegistrationStore for UnavailableStore {
    fn next_counter(&self, _bucket: &IdentifierBucket) -> Result<u32, RepositoryError> {
        offline()
    }

    fn insert_application(&self, _new: NewApplication) -> Result<Application, RepositoryError> {
        offline()
    }

    fn fetch_application(
        &self,
        _code: &RegistrationCode,
    ) -> Result<Option<Application>, RepositoryError> {
        offline()
    }

    fn search_applications(
        &self,
        _query: &ApplicationQuery,
    ) -> Result<ApplicationPage, RepositoryError> {
        offline()
    }

    fn list_statuses(&self, _active_only: bool) -> Result<Vec<Status>, RepositoryError> {
        offline()
    }

    fn fetch_status(&self, _code: &StatusCode) -> Result<Option<Status>, RepositoryError> {
        offline()
    }

    fn set_status_active(&self, _code: &StatusCode, _active: bool) -> Result<(), RepositoryError> {
        offline()
    }

    fn apply_transition(&self, _change: StatusChange) -> Result<TransitionRecord, RepositoryError> {
        offline()
    }

    fn history(&self, _application: ApplicationId) -> Result<Vec<TransitionRecord>, RepositoryError> {
        offline()
    }

    fn status_counts(&self) -> Result<Vec<(StatusCode, u64)>, RepositoryError> {
        offline()
    }
}

impl OperatorStore for UnavailableStore {
    fn insert_operator(&self, _new: NewOperator) -> Result<Operator, RepositoryError> {
        offline()
    }

    fn operator_by_email(
        &self,
        _email: &str,
    ) -> Result<Option<OperatorCredentials>, RepositoryError> {
        offline()
    }

    fn operator(&self, _id: OperatorId) -> Result<Option<Operator>, RepositoryError> {
        offline()
    }

    fn list_operators(&self) -> Result<Vec<Operator>, RepositoryError> {
        offline()
    }

    fn operator_count(&self) -> Result<u64, RepositoryError> {
        offline()
    }

    fn record_login(
        &self,
        _id: OperatorId,
        _at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn insert_session(&self, _session: SessionRecord) -> Result<(), RepositoryError> {
        offline()
    }

    fn session(&self, _token: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        offline()
    }

    fn delete_session(&self, _token: &str) -> Result<(), RepositoryError> {
        offline()
    }

    fn update_operator(
        &self,
        _id: OperatorId,
        _update: OperatorUpdate,
    ) -> Result<Operator, RepositoryError> {
        offline()
    }

    fn delete_operator(&self, _id: OperatorId) -> Result<(), RepositoryError> {
        offline()
    }

    fn purge_expired_sessions(
        &self,
        _now: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, RepositoryError> {
        offline()
    }
}
