//! Student registration intake, status workflow and audit trail.
//!
//! Intake issues a registration identifier from a durable per-bucket counter and stores the
//! application under the catalog's first active status. Operators authenticated through the
//! session layer move applications between statuses; every move is written together with an
//! append-only audit entry.

pub mod catalog;
pub mod domain;
pub mod identity;
pub mod notify;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use catalog::{StatusCatalog, DEFAULT_STATUSES};
pub use domain::{
    ApplicantIdentity, Application, ApplicationId, ApplicationPayload, FinancialDetails,
    Operator, OperatorId, RegistrationCode, RegistrationSubmission, SessionTag, Status,
    StatusCode, TransitionRecord,
};
pub use identity::{surname_prefix, IdentityGenerator};
pub use notify::{IntakeNotice, IntakeNotifier, LogNotifier, NotifyError, RecordingNotifier};
pub use policy::{PermissiveWorkflow, TerminalStatuses, TransitionPolicy};
pub use repository::{
    ApplicationPage, ApplicationQuery, IdentifierBucket, OperatorStore, OperatorUpdate,
    RegistrationStore, RepositoryError,
};
pub use router::{registration_router, run_blocking, RegistrationState};
pub use service::{
    ApplicationDetail, RegistrationError, RegistrationService, RegistrationStats, StatusCount,
};
pub use session::{
    AdminSessions, OperatorChanges, SessionError, SessionGrant, SessionPolicy,
};
pub use sqlite::SqliteRegistrationStore;
