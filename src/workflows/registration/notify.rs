use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{Application, RegistrationCode};

/// Payload handed to the confirmation collaborator (PDF + email) after intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeNotice {
    pub template: String,
    pub code: RegistrationCode,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

impl IntakeNotice {
    pub const TEMPLATE: &'static str = "registration_received";

    pub fn from_application(application: &Application) -> Self {
        let mut details = BTreeMap::new();
        details.insert(
            "surname".to_string(),
            application.applicant.surname.clone(),
        );
        details.insert(
            "given_name".to_string(),
            application.applicant.given_name.clone(),
        );
        details.insert(
            "session".to_string(),
            application.session.as_str().to_string(),
        );
        details.insert("status".to_string(), application.status.to_string());

        Self {
            template: Self::TEMPLATE.to_string(),
            code: application.code.clone(),
            recipient: application.applicant.email.clone(),
            details,
        }
    }
}

/// Outbound hook fired once per accepted registration.
pub trait IntakeNotifier: Send + Sync {
    fn notify(&self, notice: IntakeNotice) -> Result<(), NotifyError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Writes notices to the log; used when no mail transport is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl IntakeNotifier for LogNotifier {
    fn notify(&self, notice: IntakeNotice) -> Result<(), NotifyError> {
        info!(
            code = %notice.code,
            recipient = %notice.recipient,
            template = %notice.template,
            "intake confirmation queued"
        );
        Ok(())
    }
}

/// Keeps every notice in memory so callers can inspect what would have been sent.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<IntakeNotice>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<IntakeNotice> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl IntakeNotifier for RecordingNotifier {
    fn notify(&self, notice: IntakeNotice) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|_| NotifyError::Transport("notice buffer poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}
